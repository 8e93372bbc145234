//! Error types for tweetcache

use thiserror::Error;
use tweetstore::{RepositoryError, TweetId, UserId};

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by the cache itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A key string could not be split back into its segments
    #[error("malformed cache key: {0:?}")]
    MalformedKey(String),

    /// The prefix index lists an entry the store no longer holds
    #[error("prefix index lists user {owner} tweet {entity} but the store has no such entry")]
    IndexInconsistency {
        /// Owner whose region is inconsistent
        owner: UserId,
        /// Entity the index still points at
        entity: TweetId,
    },

    /// A cache must hold at least one entry
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,
}

/// Errors returned by [`TweetController`](crate::TweetController)
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Passed through unchanged from the backing repository
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A tweet could not be encoded for the cache
    #[error("failed to encode tweet: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ControllerError {
    /// Repository error behind this failure, if any
    pub fn repository(&self) -> Option<&RepositoryError> {
        match self {
            ControllerError::Repository(err) => Some(err),
            ControllerError::Codec(_) => None,
        }
    }
}
