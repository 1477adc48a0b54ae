//! # Tiered Images
//!
//! An image hosting core whose behaviour is driven by each user's account tier.
//!
//! ## Features
//!
//! - **Account tiers**: named capability sets controlling original access,
//!   expiring links and the thumbnail heights a user receives
//! - **Thumbnail generation**: one thumbnail per allowed height, regenerated
//!   whenever an image's bytes change
//! - **Expiring links**: time-limited URLs to originals, answered with `410 Gone`
//!   once their lifetime elapses
//! - **Pluggable storage**: local filesystem, S3 or memory, behind an LRU cache
//!
//! ## Architecture
//!
//! - [`tier`] - Tier catalog and the access gate
//! - [`thumbnail`] - Thumbnail rendering and the max-height cache
//! - [`store`] - Blob storage backends
//! - [`records`] - Image, thumbnail and link records
//! - [`links`] - Expiring link lifecycle
//! - [`service`] - Image service and the asset orchestrator
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiered_images::{
//!     create_router, MemoryAssetStore, RouterConfig, ServiceSettings, Services, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let services = Services::new(
//!         Arc::new(MemoryAssetStore::new()),
//!         Arc::new(SystemClock),
//!         ServiceSettings::default(),
//!     );
//!     services.catalog.seed_builtin().await;
//!
//!     let router = create_router(services, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod links;
pub mod records;
pub mod server;
pub mod service;
pub mod store;
pub mod thumbnail;
pub mod tier;
pub mod urls;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, StorageBackend, UserTierBinding};
pub use error::{
    EntityKind, RenderError, ServiceError, StoreError, TierError, ValidationError,
};
pub use links::{ExpiringLinkManager, ExpiryBounds, LinkFilter};
pub use records::{ExpiringLink, Image, RecordStore, ThumbnailAsset};
pub use server::{create_router, health_handler, ApiError, AppState, ErrorResponse, RouterConfig};
pub use service::{
    AssetOrchestrator, HeightFailure, ImageService, OrchestrationReport, ServiceSettings,
    Services, WriteOutcome,
};
pub use store::{
    create_s3_client, AssetCache, AssetKind, AssetStore, CachedAssetStore, LocalAssetStore,
    MemoryAssetStore, S3AssetStore,
};
pub use thumbnail::{scaled_width, MaxHeightCache, ThumbnailEngine};
pub use tier::{
    AccessGate, AccountTier, Capabilities, ThumbnailSpec, TierCatalog, UserId, BASIC_TIER,
    ENTERPRISE_TIER, PREMIUM_TIER,
};
