//! Cache configuration

use std::sync::Arc;

use crate::cache::TweetCache;
use crate::error::Result;

/// Default number of cached entries
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Settings for the service's cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries, counting both key shapes
    pub capacity: usize,
    /// When false the controller reads straight from the repository
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Enable or disable caching
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build the cache, or `None` when caching is disabled
    pub fn build(&self) -> Result<Option<Arc<TweetCache>>> {
        if !self.enabled {
            return Ok(None);
        }
        TweetCache::new(self.capacity).map(|cache| Some(Arc::new(cache)))
    }
}
