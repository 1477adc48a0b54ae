//! Image lifecycle services.
//!
//! [`Services`] wires the catalog, record store, blob store and clock into the
//! components the HTTP layer and the binary use.

mod images;
mod orchestrator;

pub use images::{ImageService, WriteOutcome};
pub use orchestrator::{AssetOrchestrator, HeightFailure, OrchestrationReport};

use std::sync::Arc;

use chrono::Duration;

use crate::clock::SharedClock;
use crate::error::{EntityKind, ServiceError, StoreError};
use crate::links::{ExpiringLinkManager, ExpiryBounds};
use crate::records::RecordStore;
use crate::store::AssetStore;
use crate::thumbnail::{MaxHeightCache, DEFAULT_MAX_HEIGHT_TTL_SECS};
use crate::tier::TierCatalog;

/// Tunables for [`Services::new`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub expiry_bounds: ExpiryBounds,
    pub max_height_ttl: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            expiry_bounds: ExpiryBounds::default(),
            max_height_ttl: Duration::seconds(DEFAULT_MAX_HEIGHT_TTL_SECS),
        }
    }
}

/// The fully wired service graph.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<TierCatalog>,
    pub records: Arc<RecordStore>,
    pub orchestrator: Arc<AssetOrchestrator>,
    pub images: Arc<ImageService>,
    pub links: Arc<ExpiringLinkManager>,
    pub clock: SharedClock,
}

impl Services {
    /// Build the services over `store`. The catalog starts empty; call
    /// [`TierCatalog::seed_builtin`] to install the default tiers.
    pub fn new(store: Arc<dyn AssetStore>, clock: SharedClock, settings: ServiceSettings) -> Self {
        let height_cache = Arc::new(MaxHeightCache::new(settings.max_height_ttl, clock.clone()));
        let catalog = Arc::new(TierCatalog::with_height_cache(height_cache.clone()));
        let records = Arc::new(RecordStore::new());

        let orchestrator = Arc::new(AssetOrchestrator::new(
            catalog.clone(),
            records.clone(),
            store.clone(),
            clock.clone(),
        ));

        let images = Arc::new(ImageService::new(
            catalog.clone(),
            records.clone(),
            store.clone(),
            orchestrator.clone(),
            height_cache,
            clock.clone(),
        ));

        let links = Arc::new(ExpiringLinkManager::new(
            catalog.clone(),
            records.clone(),
            store,
            clock.clone(),
            settings.expiry_bounds,
        ));

        Self {
            catalog,
            records,
            orchestrator,
            images,
            links,
            clock,
        }
    }
}

/// Map a missing blob behind an existing record to a `NotFound` for the record.
pub(crate) fn missing_blob(kind: EntityKind, id: uuid::Uuid) -> impl FnOnce(StoreError) -> ServiceError {
    move |err| match err {
        StoreError::NotFound(_) => ServiceError::not_found(kind, id),
        other => ServiceError::Store(other),
    }
}
