//! LRU read cache in front of a blob store.
//!
//! Served originals and thumbnails are read far more often than they are
//! written. [`CachedAssetStore`] keeps recently read blobs in memory, bounded
//! by total size in bytes, and drops a key whenever it is written or deleted.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use super::AssetStore;
use crate::error::StoreError;

/// Default cache capacity: 64MB
pub const DEFAULT_ASSET_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Asset Cache
// =============================================================================

/// Size-bounded LRU map from storage key to blob bytes.
pub struct AssetCache {
    cache: RwLock<LruCache<String, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl AssetCache {
    /// Create a cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get a blob, marking it as recently used.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check if a key is cached without updating LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a blob, evicting least-recently-used entries while over capacity.
    ///
    /// Blobs larger than the whole cache are not stored.
    pub async fn put(&self, key: String, data: Bytes) {
        let data_size = data.len();
        if data_size > self.max_size {
            self.remove(&key).await;
            return;
        }

        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old_data) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old_data.len());
        }

        // An entry pushed out by the entry-count bound still counts toward the size
        if let Some((evicted_key, evicted_data)) = cache.push(key, data) {
            if !cache.contains(&evicted_key) {
                *current_size = current_size.saturating_sub(evicted_data.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            if let Some((_, evicted_data)) = cache.pop_lru() {
                *current_size = current_size.saturating_sub(evicted_data.len());
            } else {
                break;
            }
        }
    }

    /// Remove a blob. Returns the cached data if it existed.
    pub async fn remove(&self, key: &str) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let data = cache.pop(key)?;
        *current_size = current_size.saturating_sub(data.len());
        Some(data)
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached blobs in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

// =============================================================================
// Cached Store
// =============================================================================

/// Read-through cache wrapping another [`AssetStore`].
pub struct CachedAssetStore<S> {
    inner: S,
    cache: AssetCache,
}

impl<S: AssetStore> CachedAssetStore<S> {
    pub fn new(inner: S, max_size: usize) -> Self {
        Self {
            inner,
            cache: AssetCache::with_capacity(max_size),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }
}

#[async_trait]
impl<S: AssetStore> AssetStore for CachedAssetStore<S> {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StoreError> {
        self.cache.remove(key).await;
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        if let Some(data) = self.cache.get(key).await {
            return Ok(data);
        }

        let data = self.inner.get(key).await?;
        self.cache.put(key.to_string(), data.clone()).await;
        Ok(data)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        if self.cache.contains(key).await {
            return Ok(true);
        }
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.remove(key).await;
        self.inner.delete(key).await
    }
}

// =============================================================================
// Tests
// =============================================================================
