//! TweetCache: bounded LRU store with a per-user prefix index
//!
//! The LRU list and the prefix index sit behind one mutex and change together:
//! every compound key in the store has a path in the index and every index path
//! names a compound key in the store. `get` promotes recency, so reads mutate
//! too and a reader/writer split would buy nothing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use tweetstore::{TweetId, UserId};

use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use crate::lru::LruCache;
use crate::stats::CacheStats;
use crate::trie::PrefixIndex;

/// State guarded by the cache lock
struct Inner {
    lru: LruCache<CacheKey, Vec<u8>>,
    index: PrefixIndex<UserId, TweetId>,
}

impl Inner {
    fn put(&mut self, key: CacheKey, value: Vec<u8>, stats: &CacheStats) {
        if !self.lru.contains(&key) {
            stats.record_insert();
        }

        if let Some((evicted, _)) = self.lru.put(key, value) {
            stats.record_eviction();
            debug!(key = %evicted, "evicted least recently used entry");
            if let CacheKey::Compound { owner, entity } = evicted {
                self.index.remove(&owner, &entity);
            }
        }

        if let CacheKey::Compound { owner, entity } = key {
            self.index.insert(owner, entity);
        }
    }

    fn remove(&mut self, key: &CacheKey, stats: &CacheStats) -> bool {
        let removed = self.lru.remove(key).is_some();
        if removed {
            stats.record_removal();
        }
        if let CacheKey::Compound { owner, entity } = *key {
            self.index.remove(&owner, &entity);
        }
        removed
    }
}

/// Bounded, thread-safe cache of serialized tweets
pub struct TweetCache {
    /// LRU store and prefix index, mutated together
    inner: Mutex<Inner>,

    /// Cache statistics
    stats: Arc<CacheStats>,

    /// Maximum number of entries, of either key shape
    capacity: usize,
}

impl TweetCache {
    /// Create a cache holding at most `capacity` entries
    ///
    /// # Errors
    /// * `CacheError::ZeroCapacity` - `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                index: PrefixIndex::new(),
            }),
            stats: Arc::new(CacheStats::new()),
            capacity,
        })
    }

    /// Get a value, marking it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.lru.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Get a value without promoting it or counting a hit
    pub fn peek(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.inner.lock().lru.peek(key).cloned()
    }

    /// Insert or overwrite a value.
    ///
    /// When the cache is full the least recently used entry is evicted, along
    /// with its index path if it was a compound key.
    pub fn put(&self, key: CacheKey, value: Vec<u8>) {
        self.inner.lock().put(key, value, &self.stats);
    }

    /// Insert several entries under one lock acquisition
    pub fn put_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (CacheKey, Vec<u8>)>,
    {
        let mut inner = self.inner.lock();
        for (key, value) in entries {
            inner.put(key, value, &self.stats);
        }
    }

    /// Remove an entry if present, along with its index path
    pub fn remove(&self, key: &CacheKey) {
        self.inner.lock().remove(key, &self.stats);
    }

    /// Remove several entries under one lock acquisition.
    ///
    /// Returns how many were present.
    pub fn remove_many(&self, keys: &[CacheKey]) -> usize {
        let mut inner = self.inner.lock();
        keys.iter()
            .filter(|key| inner.remove(key, &self.stats))
            .count()
    }

    /// Every cached tweet of `owner`, in ascending tweet id order.
    ///
    /// Each value found is promoted as by [`get`](Self::get). An owner with
    /// nothing cached yields an empty vector.
    ///
    /// # Errors
    /// * `CacheError::IndexInconsistency` - the index lists a tweet the store
    ///   does not hold; no partial result is returned
    pub fn find_by_prefix(&self, owner: UserId) -> Result<Vec<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let entities = inner.index.list_second_level(&owner);

        let mut values = Vec::with_capacity(entities.len());
        for entity in entities {
            match inner.lru.get(&CacheKey::user_tweet(owner, entity)) {
                Some(value) => values.push(value.clone()),
                None => {
                    self.stats.record_inconsistency();
                    warn!(%owner, %entity, "prefix index lists a tweet missing from the store");
                    return Err(CacheError::IndexInconsistency { owner, entity });
                }
            }
        }

        if values.is_empty() {
            self.stats.record_miss();
        } else {
            self.stats.record_hit();
        }
        Ok(values)
    }

    /// Drop every compound entry of `owner` together with its index branch.
    ///
    /// Returns how many store entries were removed.
    pub fn invalidate_prefix(&self, owner: UserId) -> usize {
        let mut inner = self.inner.lock();
        let entities = inner.index.remove_first(&owner);

        let removed = entities
            .into_iter()
            .filter(|&entity| inner.lru.remove(&CacheKey::user_tweet(owner, entity)).is_some())
            .count();
        for _ in 0..removed {
            self.stats.record_removal();
        }

        debug!(%owner, removed, "invalidated user region");
        removed
    }

    /// Check that the index and the store mirror each other
    ///
    /// # Errors
    /// * `CacheError::IndexInconsistency` - the first mismatch found
    pub fn verify_index(&self) -> Result<()> {
        let inner = self.inner.lock();

        for (&owner, &entity) in inner.index.paths() {
            if !inner.lru.contains(&CacheKey::user_tweet(owner, entity)) {
                return Err(CacheError::IndexInconsistency { owner, entity });
            }
        }
        for key in inner.lru.keys() {
            if let CacheKey::Compound { owner, entity } = *key {
                if !inner.index.contains(&owner, &entity) {
                    return Err(CacheError::IndexInconsistency { owner, entity });
                }
            }
        }
        Ok(())
    }

    /// Check if `key` is cached, without promoting it
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.lock().lru.keys().copied().collect()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Number of paths in the prefix index
    pub fn index_len(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove a store entry while leaving its index path behind
    #[cfg(test)]
    pub(crate) fn detach_store_entry(&self, key: &CacheKey) {
        self.inner.lock().lru.remove(key);
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.index.clear();
        self.stats.reset();
    }
}

impl fmt::Debug for TweetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweetCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
