//! In-process tweet table
//!
//! Stands in for the SQL-backed repository: same batching and not-found
//! semantics, rows kept in a `BTreeMap` ordered by tweet id. Every call is
//! recorded so callers can check how the cache layer used the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{RepositoryError, Result};
use crate::model::{NewTweet, Tweet, TweetId, UserId};
use crate::repository::TweetRepository;

/// Calls made against a [`MemoryRepository`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallLog {
    /// Argument of every `get_by_tweet` call, in call order
    pub by_tweet: Vec<Vec<TweetId>>,
    /// Argument of every `get_by_user` call, in call order
    pub by_user: Vec<Vec<UserId>>,
    /// Number of `put` calls
    pub puts: usize,
    /// Argument of every `delete` call
    pub deletes: Vec<TweetId>,
}

/// Tweet repository held in memory
#[derive(Debug)]
pub struct MemoryRepository {
    rows: RwLock<BTreeMap<TweetId, Tweet>>,
    next_id: AtomicU64,
    calls: Mutex<CallLog>,
    fail_write: AtomicBool,
    fail_delete: AtomicBool,
    latency: Option<Duration>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Create an empty repository. Ids start at 1.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(CallLog::default()),
            fail_write: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Delay every call by `latency` before touching the table
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert a fully formed row, bypassing id assignment
    pub fn insert(&self, tweet: Tweet) {
        self.next_id.fetch_max(tweet.tweet_id.0 + 1, Ordering::Relaxed);
        self.rows.write().insert(tweet.tweet_id, tweet);
    }

    /// Make the next `put` fail with an I/O error
    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    /// Make the next `delete` fail with an I/O error
    pub fn fail_next_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> CallLog {
        self.calls.lock().clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        *self.calls.lock() = CallLog::default();
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn non_empty(rows: Vec<Tweet>) -> Result<Vec<Tweet>> {
        if rows.is_empty() {
            Err(RepositoryError::NotFound)
        } else {
            Ok(rows)
        }
    }
}

#[async_trait]
impl TweetRepository for MemoryRepository {
    async fn put(&self, tweet: NewTweet) -> Result<Tweet> {
        self.calls.lock().puts += 1;
        self.simulate_latency().await;

        if self.fail_write.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Io("write rejected".to_string()));
        }

        let tweet_id = TweetId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let row = Tweet {
            user_id: tweet.user_id,
            tweet_id,
            retweet_id: tweet.retweet_id,
            content: tweet.content,
            media_url: tweet.media_url,
            created_at: Utc::now(),
        };
        self.rows.write().insert(tweet_id, row.clone());
        debug!(tweet = %tweet_id, user = %row.user_id, "stored tweet");

        Ok(row)
    }

    async fn get_by_tweet(&self, ids: &[TweetId]) -> Result<Vec<Tweet>> {
        self.calls.lock().by_tweet.push(ids.to_vec());
        self.simulate_latency().await;

        let rows = self.rows.read();
        let found = rows
            .values()
            .filter(|row| ids.contains(&row.tweet_id))
            .cloned()
            .collect();
        Self::non_empty(found)
    }

    async fn get_by_user(&self, ids: &[UserId]) -> Result<Vec<Tweet>> {
        self.calls.lock().by_user.push(ids.to_vec());
        self.simulate_latency().await;

        let rows = self.rows.read();
        let found = rows
            .values()
            .filter(|row| ids.contains(&row.user_id))
            .cloned()
            .collect();
        Self::non_empty(found)
    }

    async fn delete(&self, id: TweetId) -> Result<()> {
        self.calls.lock().deletes.push(id);
        self.simulate_latency().await;

        if self.fail_delete.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Io("delete rejected".to_string()));
        }

        match self.rows.write().remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_assigns_ids() {
        let repo = MemoryRepository::new();

        let first = repo.put(NewTweet::new(UserId(1), "a")).await.unwrap();
        let second = repo.put(NewTweet::new(UserId(1), "b")).await.unwrap();

        assert_eq!(first.tweet_id, TweetId(1));
        assert_eq!(second.tweet_id, TweetId(2));
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_get_by_tweet_and_user() {
        let repo = MemoryRepository::new();
        repo.put(NewTweet::new(UserId(1), "a")).await.unwrap();
        repo.put(NewTweet::new(UserId(2), "b")).await.unwrap();
        repo.put(NewTweet::new(UserId(1), "c")).await.unwrap();

        let by_tweet = repo.get_by_tweet(&[TweetId(3), TweetId(2)]).await.unwrap();
        let ids: Vec<_> = by_tweet.iter().map(|t| t.tweet_id).collect();
        assert_eq!(ids, vec![TweetId(2), TweetId(3)]);

        let by_user = repo.get_by_user(&[UserId(1)]).await.unwrap();
        assert_eq!(by_user.len(), 2);
        assert!(by_user.iter().all(|t| t.user_id == UserId(1)));
    }

    #[tokio::test]
    async fn test_not_found() {
        let repo = MemoryRepository::new();

        assert_eq!(repo.get_by_tweet(&[TweetId(1)]).await, Err(RepositoryError::NotFound));
        assert_eq!(repo.get_by_user(&[UserId(1)]).await, Err(RepositoryError::NotFound));
        assert_eq!(repo.delete(TweetId(1)).await, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_injected_failures_fire_once() {
        let repo = MemoryRepository::new();

        repo.fail_next_write();
        assert!(matches!(
            repo.put(NewTweet::new(UserId(1), "a")).await,
            Err(RepositoryError::Io(_))
        ));
        let row = repo.put(NewTweet::new(UserId(1), "a")).await.unwrap();

        repo.fail_next_delete();
        assert!(matches!(repo.delete(row.tweet_id).await, Err(RepositoryError::Io(_))));
        repo.delete(row.tweet_id).await.unwrap();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_call_log() {
        let repo = MemoryRepository::new();
        repo.put(NewTweet::new(UserId(4), "a")).await.unwrap();
        let _ = repo.get_by_tweet(&[TweetId(1), TweetId(9)]).await;
        let _ = repo.get_by_user(&[UserId(4)]).await;

        let calls = repo.calls();
        assert_eq!(calls.puts, 1);
        assert_eq!(calls.by_tweet, vec![vec![TweetId(1), TweetId(9)]]);
        assert_eq!(calls.by_user, vec![vec![UserId(4)]]);

        repo.reset_calls();
        assert_eq!(repo.calls(), CallLog::default());
    }

    #[tokio::test]
    async fn test_insert_advances_sequence() {
        let repo = MemoryRepository::new();
        repo.insert(Tweet {
            user_id: UserId(1),
            tweet_id: TweetId(10),
            retweet_id: None,
            content: "seed".to_string(),
            media_url: None,
            created_at: Utc::now(),
        });

        let next = repo.put(NewTweet::new(UserId(1), "next")).await.unwrap();
        assert_eq!(next.tweet_id, TweetId(11));
    }
}
