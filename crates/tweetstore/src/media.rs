//! Blob storage for media attached to tweets
//!
//! Tweets carry only the location returned by [`MediaStore::save`]; the bytes
//! live in the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{RepositoryError, Result};

/// Media bytes uploaded alongside a new tweet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name, kept as the last segment of the stored location
    pub name: String,
    /// Raw file contents
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Blob store holding tweet media
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `attachment`, returning the location to record on the tweet
    async fn save(&self, attachment: Attachment) -> Result<String>;

    /// Bytes stored at `location`
    async fn load(&self, location: &str) -> Result<Vec<u8>>;

    /// Drop the blob at `location`
    async fn delete(&self, location: &str) -> Result<()>;
}

/// Operations made against a [`MemoryMediaStore`], in call order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaLog {
    /// Names passed to `save`
    pub saves: Vec<String>,
    /// Locations passed to `load`
    pub loads: Vec<String>,
    /// Locations passed to `delete`
    pub deletes: Vec<String>,
}

/// Media store held in memory
#[derive(Debug)]
pub struct MemoryMediaStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    calls: Mutex<MediaLog>,
    fail_save: AtomicBool,
    fail_delete: AtomicBool,
}

impl Default for MemoryMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMediaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(MediaLog::default()),
            fail_save: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// Make the next `save` fail with an I/O error
    pub fn fail_next_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    /// Make the next `delete` fail with an I/O error
    pub fn fail_next_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> MediaLog {
        self.calls.lock().clone()
    }

    /// Check whether a blob is stored at `location`
    pub fn contains(&self, location: &str) -> bool {
        self.blobs.read().contains_key(location)
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn save(&self, attachment: Attachment) -> Result<String> {
        self.calls.lock().saves.push(attachment.name.clone());

        if self.fail_save.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Io("media upload rejected".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let location = format!("media/{}/{}", id, attachment.name);
        debug!(%location, bytes = attachment.data.len(), "stored media");
        self.blobs.write().insert(location.clone(), attachment.data);
        Ok(location)
    }

    async fn load(&self, location: &str) -> Result<Vec<u8>> {
        self.calls.lock().loads.push(location.to_string());

        self.blobs
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| RepositoryError::MissingMedia(location.to_string()))
    }

    async fn delete(&self, location: &str) -> Result<()> {
        self.calls.lock().deletes.push(location.to_string());

        if self.fail_delete.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Io("media delete rejected".to_string()));
        }

        match self.blobs.write().remove(location) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::MissingMedia(location.to_string())),
        }
    }
}
