//! Tweet records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::Attachment;

/// Identifier of the user owning a tweet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Identifier of a tweet, assigned by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TweetId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TweetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored tweet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    /// Owner of the tweet
    pub user_id: UserId,
    /// Identifier assigned on write
    pub tweet_id: TweetId,
    /// Tweet this one retweets, if any
    pub retweet_id: Option<TweetId>,
    /// Text body
    pub content: String,
    /// Location of attached media in blob storage
    pub media_url: Option<String>,
    /// Creation timestamp assigned on write
    pub created_at: DateTime<Utc>,
}

impl Tweet {
    /// Serialize to the JSON bytes held by the cache
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize from cached JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A tweet before the repository has assigned its id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTweet {
    /// Author
    pub user_id: UserId,
    /// Text body
    pub content: String,
    /// Location of attached media in blob storage
    pub media_url: Option<String>,
    /// Tweet being retweeted
    pub retweet_id: Option<TweetId>,
    /// Media still to be uploaded; its stored location replaces `media_url`
    pub attachment: Option<Attachment>,
}

impl NewTweet {
    /// Plain text tweet with no media and no retweet
    pub fn new(user_id: UserId, content: impl Into<String>) -> Self {
        Self {
            user_id,
            content: content.into(),
            media_url: None,
            retweet_id: None,
            attachment: None,
        }
    }

    /// Mark this tweet as a retweet of `id`
    pub fn retweet_of(mut self, id: TweetId) -> Self {
        self.retweet_id = Some(id);
        self
    }

    /// Attach a media location
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    /// Upload `attachment` with the tweet
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
