//! Blob storage for originals and thumbnails.
//!
//! The store is an opaque key-value store for image bytes. Keys are generated
//! by the service layer, never taken from user input.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              CachedAssetStore                │  LRU read cache (bytes-bounded)
//! └──────────────────────┬───────────────────────┘
//!                        │ AssetStore
//!        ┌───────────────┼────────────────┐
//!        ▼               ▼                ▼
//! ┌─────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ LocalAsset  │ │  S3Asset     │ │ MemoryAsset  │
//! │ Store       │ │  Store       │ │ Store        │
//! └─────────────┘ └──────────────┘ └──────────────┘
//! ```

mod cache;
mod local;
mod memory;
mod s3;

pub use cache::{AssetCache, CachedAssetStore, DEFAULT_ASSET_CACHE_CAPACITY};
pub use local::LocalAssetStore;
pub use memory::MemoryAssetStore;
pub use s3::{create_s3_client, S3AssetStore};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::StoreError;

/// Key prefix for uploaded originals.
pub const ORIGINALS_PREFIX: &str = "images/originals";

/// Key prefix for generated thumbnails.
pub const THUMBNAILS_PREFIX: &str = "images/thumb";

/// Key-addressed blob storage.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing blob. Returns the key.
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StoreError>;

    /// Read the blob stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] if no blob exists.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Check whether a blob exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove the blob under `key`. Removing a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// What a generated key will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Original,
    Thumbnail,
}

impl AssetKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            AssetKind::Original => ORIGINALS_PREFIX,
            AssetKind::Thumbnail => THUMBNAILS_PREFIX,
        }
    }
}

/// Generate a fresh, collision-free key such as `images/thumb/<uuid-hex>.png`.
pub fn random_key(kind: AssetKind, extension: &str) -> String {
    format!(
        "{}/{}.{}",
        kind.prefix(),
        Uuid::new_v4().simple(),
        extension
    )
}

/// Reject keys that are empty or could escape a storage root.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
