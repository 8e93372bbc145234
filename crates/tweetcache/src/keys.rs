//! Cache keys
//!
//! Two shapes: a simple key naming one identifier domain (`tweet_id_42`) and a
//! compound key joining an owner and an entity (`user_id_7:tweet_id_42`). The
//! cache stores [`CacheKey`] values; the string form is produced by the
//! builders below and read back by [`parse_compound`] and `FromStr`.

use std::fmt;
use std::str::FromStr;

use tweetstore::{TweetId, UserId};

use crate::error::{CacheError, Result};

/// Separator between the owner and entity segments of a compound key.
///
/// Never produced inside a simple key, so a compound key splits in exactly one place.
pub const COMPOUND_SEPARATOR: char = ':';

/// Identifier domain of a simple key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDomain {
    /// Keyed by owning user
    User,
    /// Keyed by tweet
    Tweet,
}

impl KeyDomain {
    /// String prefix used for this domain
    pub const fn prefix(self) -> &'static str {
        match self {
            KeyDomain::User => "user_id",
            KeyDomain::Tweet => "tweet_id",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "user_id" => Some(KeyDomain::User),
            "tweet_id" => Some(KeyDomain::Tweet),
            _ => None,
        }
    }
}

/// Key of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One identifier domain
    Simple {
        /// Domain of `id`
        domain: KeyDomain,
        /// Raw identifier
        id: u64,
    },
    /// Owner then entity; indexed by owner for prefix lookups
    Compound {
        /// Owning user
        owner: UserId,
        /// Tweet
        entity: TweetId,
    },
}

impl CacheKey {
    /// Tweet looked up by its own id
    pub const fn tweet(id: TweetId) -> Self {
        CacheKey::Simple {
            domain: KeyDomain::Tweet,
            id: id.0,
        }
    }

    /// User prefix; only meaningful as the first segment of a compound key
    pub const fn user(id: UserId) -> Self {
        CacheKey::Simple {
            domain: KeyDomain::User,
            id: id.0,
        }
    }

    /// Tweet looked up through its owner
    pub const fn user_tweet(owner: UserId, entity: TweetId) -> Self {
        CacheKey::Compound { owner, entity }
    }

    /// Owner and entity of a compound key
    pub fn compound_parts(&self) -> Option<(UserId, TweetId)> {
        match *self {
            CacheKey::Compound { owner, entity } => Some((owner, entity)),
            CacheKey::Simple { .. } => None,
        }
    }

    /// Check if this is a compound key
    pub fn is_compound(&self) -> bool {
        matches!(self, CacheKey::Compound { .. })
    }
}

/// Encode a simple key: `<domain>_<id>`
pub fn build_simple(domain: KeyDomain, id: u64) -> String {
    format!("{}_{}", domain.prefix(), id)
}

/// Encode a compound key: `user_id_<owner>:tweet_id_<entity>`
pub fn build_compound(owner: UserId, entity: TweetId) -> String {
    format!(
        "{}{}{}",
        build_simple(KeyDomain::User, owner.0),
        COMPOUND_SEPARATOR,
        build_simple(KeyDomain::Tweet, entity.0)
    )
}

/// Split a compound key into its owner and entity segments.
///
/// Fails when the separator is missing or repeated, or when either segment
/// is not a simple key of the expected domain.
pub fn parse_compound(key: &str) -> Result<(String, String)> {
    let (owner, entity) = split_compound(key)?;
    Ok((owner.to_string(), entity.to_string()))
}

fn split_compound(key: &str) -> Result<(&str, &str)> {
    let mut parts = key.split(COMPOUND_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(entity), None) => {
            expect_domain(key, owner, KeyDomain::User)?;
            expect_domain(key, entity, KeyDomain::Tweet)?;
            Ok((owner, entity))
        }
        _ => Err(malformed(key)),
    }
}

fn expect_domain(key: &str, segment: &str, expected: KeyDomain) -> Result<u64> {
    match parse_simple(segment) {
        Some((domain, id)) if domain == expected => Ok(id),
        _ => Err(malformed(key)),
    }
}

fn parse_simple(segment: &str) -> Option<(KeyDomain, u64)> {
    let (prefix, digits) = segment.rsplit_once('_')?;
    let domain = KeyDomain::from_prefix(prefix)?;

    // canonical decimal only, so parsing stays the exact inverse of building
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if !canonical {
        return None;
    }

    digits.parse().ok().map(|id| (domain, id))
}

fn malformed(key: &str) -> CacheError {
    CacheError::MalformedKey(key.to_string())
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CacheKey::Simple { domain, id } => f.write_str(&build_simple(domain, id)),
            CacheKey::Compound { owner, entity } => f.write_str(&build_compound(owner, entity)),
        }
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(COMPOUND_SEPARATOR) {
            let (owner, entity) = split_compound(s)?;
            let owner = expect_domain(s, owner, KeyDomain::User)?;
            let entity = expect_domain(s, entity, KeyDomain::Tweet)?;
            return Ok(CacheKey::user_tweet(UserId(owner), TweetId(entity)));
        }

        parse_simple(s)
            .map(|(domain, id)| CacheKey::Simple { domain, id })
            .ok_or_else(|| malformed(s))
    }
}
