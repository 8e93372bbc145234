//! Error types for tweetstore

use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors reported by a backing repository
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No rows matched the request
    #[error("there are no tweets for your request")]
    NotFound,

    /// No media blob is stored at the given location
    #[error("no media stored at {0}")]
    MissingMedia(String),

    /// Storage failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The request context was cancelled before the call finished
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline passed before the call finished
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}
