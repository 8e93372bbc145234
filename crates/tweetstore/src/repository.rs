//! Backing repository contract

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{NewTweet, Tweet, TweetId, UserId};

/// Source of truth for tweets.
///
/// Lookups are batched: one call per request, never one per id. Lookups that
/// match nothing fail with [`RepositoryError::NotFound`](crate::RepositoryError::NotFound).
#[async_trait]
pub trait TweetRepository: Send + Sync {
    /// Store a new tweet, returning it with its assigned id and timestamp
    async fn put(&self, tweet: NewTweet) -> Result<Tweet>;

    /// Fetch every tweet whose id is in `ids`
    async fn get_by_tweet(&self, ids: &[TweetId]) -> Result<Vec<Tweet>>;

    /// Fetch every tweet owned by a user in `ids`
    async fn get_by_user(&self, ids: &[UserId]) -> Result<Vec<Tweet>>;

    /// Delete one tweet
    async fn delete(&self, id: TweetId) -> Result<()>;
}
