//! # tweetcache
//!
//! In-process cache for the tweets service.
//!
//! ## Architecture
//! - **Keys**: simple (`tweet_id_42`) and compound (`user_id_7:tweet_id_42`) cache keys
//! - **LRU List**: slab-backed doubly-linked list for O(1) eviction
//! - **Prefix Index**: two-level trie from user to cached tweet ids, kept in
//!   step with the LRU store so a user's tweets can be listed without a scan
//! - **Controller**: cache-aside batch lookups over a [`tweetstore::TweetRepository`]
//!
//! One mutex covers the LRU store and the prefix index together. The
//! controller's multi-step flows are deliberately not atomic; see
//! [`controller`] for the race this allows.

#![warn(missing_docs)]

mod cache;
mod config;
pub mod controller;
mod error;
pub mod keys;
mod lru;
mod stats;
mod trie;

pub use cache::TweetCache;
pub use config::{CacheConfig, DEFAULT_CAPACITY};
pub use controller::TweetController;
pub use error::{CacheError, ControllerError, Result};
pub use keys::{CacheKey, KeyDomain};
pub use stats::{CacheStats, StatsSnapshot};
pub use trie::PrefixIndex;
