//! Thumbnail regeneration pipeline.
//!
//! Runs whenever an image's stored file changes and keeps its thumbnail set in
//! line with the owner's tier.
//!
//! # Pipeline
//!
//! ```text
//! on_image_write(image, previous_file)
//!   │
//!   ├─ previous_file == image.file ──────────────► nothing to do
//!   │
//!   ├─ resolve owner's allowed heights (UnknownTier aborts)
//!   ├─ load original bytes
//!   │
//!   ├─ render every height on the blocking pool ─┐ (parallel)
//!   │                                            │
//!   └─ per finished height:                      ▼
//!        store blob ─► upsert (image, height) ─► drop superseded blob
//! ```
//!
//! A failure at any step of one height is recorded in the report and never
//! touches the other heights.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::error::{RenderError, ServiceError};
use crate::records::{Image, RecordStore, ThumbnailAsset};
use crate::store::{random_key, AssetKind, AssetStore};
use crate::thumbnail::{RenderedThumbnail, ThumbnailEngine};
use crate::tier::TierCatalog;

// =============================================================================
// Report
// =============================================================================

/// A thumbnail height that could not be produced.
#[derive(Debug, Clone)]
pub struct HeightFailure {
    pub height: u32,
    pub error: ServiceError,
}

/// Outcome of one orchestration pass.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    /// Assets created or updated, ordered by height
    pub assets: Vec<ThumbnailAsset>,

    /// Heights that failed, ordered by height
    pub failures: Vec<HeightFailure>,

    /// True when the stored file was unchanged and nothing ran
    pub skipped: bool,
}

impl OrchestrationReport {
    fn unchanged() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Whether every requested height was produced.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn asset_for(&self, height: u32) -> Option<&ThumbnailAsset> {
        self.assets.iter().find(|a| a.height == height)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Keeps each image's thumbnails consistent with its owner's tier.
pub struct AssetOrchestrator {
    catalog: Arc<TierCatalog>,
    records: Arc<RecordStore>,
    store: Arc<dyn AssetStore>,
    engine: ThumbnailEngine,
    clock: SharedClock,
}

impl AssetOrchestrator {
    pub fn new(
        catalog: Arc<TierCatalog>,
        records: Arc<RecordStore>,
        store: Arc<dyn AssetStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            catalog,
            records,
            store,
            engine: ThumbnailEngine::new(),
            clock,
        }
    }

    /// React to an image being written.
    ///
    /// `previous_file` is the storage key the image pointed to before this
    /// write, or `None` for a new image. When it equals `image.file` the write
    /// was metadata-only and no thumbnails are touched.
    ///
    /// Heights that are no longer allowed are left in place; see
    /// [`AssetOrchestrator::reconcile`].
    pub async fn on_image_write(
        &self,
        image: &Image,
        previous_file: Option<&str>,
    ) -> Result<OrchestrationReport, ServiceError> {
        if previous_file == Some(image.file.as_str()) {
            debug!(image_id = %image.id, "Stored file unchanged, skipping thumbnail generation");
            return Ok(OrchestrationReport::unchanged());
        }

        self.regenerate(image).await
    }

    /// Render and persist every allowed height of `image`, unconditionally.
    pub async fn regenerate(&self, image: &Image) -> Result<OrchestrationReport, ServiceError> {
        let caps = self
            .catalog
            .capabilities_for_user(&image.owner)
            .await
            .map_err(|e| {
                error!(image_id = %image.id, owner = %image.owner, error = %e, "Owner bound to unknown tier");
                ServiceError::from(e)
            })?;

        let heights: BTreeSet<u32> = caps.map(|c| c.allowed_heights).unwrap_or_default();
        if heights.is_empty() {
            debug!(image_id = %image.id, owner = %image.owner, "Owner has no thumbnail heights");
            return Ok(OrchestrationReport::default());
        }

        let source = self.store.get(&image.file).await?;

        let mut renders = JoinSet::new();
        for &height in &heights {
            let engine = self.engine.clone();
            let source = source.clone();
            let (width, source_height) = (image.width, image.height);
            renders.spawn_blocking(move || {
                (height, engine.render(&source, width, source_height, height))
            });
        }

        let mut report = OrchestrationReport::default();
        let mut pending = heights;

        while let Some(joined) = renders.join_next().await {
            let (height, rendered) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(image_id = %image.id, error = %e, "Thumbnail render task failed");
                    continue;
                }
            };
            pending.remove(&height);

            let outcome = match rendered {
                Ok(rendered) => self.persist(image, height, rendered).await,
                Err(e) => Err(ServiceError::from(e)),
            };

            match outcome {
                Ok(asset) => report.assets.push(asset),
                Err(error) => {
                    warn!(image_id = %image.id, height, error = %error, "Thumbnail generation failed");
                    report.failures.push(HeightFailure { height, error });
                }
            }
        }

        // Heights whose task panicked never reported back
        for height in pending {
            report.failures.push(HeightFailure {
                height,
                error: ServiceError::Decode(RenderError::Decode {
                    message: "render task aborted".to_string(),
                }),
            });
        }

        report.assets.sort_by_key(|a| a.height);
        report.failures.sort_by_key(|f| f.height);

        info!(
            image_id = %image.id,
            generated = report.assets.len(),
            failed = report.failures.len(),
            "Thumbnails regenerated"
        );

        Ok(report)
    }

    /// Store one rendered thumbnail and upsert its record.
    async fn persist(
        &self,
        image: &Image,
        height: u32,
        rendered: RenderedThumbnail,
    ) -> Result<ThumbnailAsset, ServiceError> {
        let key = random_key(AssetKind::Thumbnail, rendered.extension());
        self.store.put(&key, rendered.bytes).await?;

        let upserted = self
            .records
            .upsert_thumbnail(image.id, height, rendered.width, key.clone(), self.clock.now())
            .await;

        match upserted {
            Ok(outcome) => {
                if let Some(old) = outcome.superseded {
                    self.discard_blob(&old).await;
                }
                Ok(outcome.asset)
            }
            Err(e) => {
                // Image was deleted while rendering
                self.discard_blob(&key).await;
                Err(e)
            }
        }
    }

    /// Delete thumbnails whose height the owner's tier no longer allows.
    ///
    /// Returns the removed heights. An owner without a tier binding keeps no
    /// thumbnails.
    pub async fn reconcile(&self, image: &Image) -> Result<Vec<u32>, ServiceError> {
        let caps = self.catalog.capabilities_for_user(&image.owner).await?;
        let allowed = caps.map(|c| c.allowed_heights).unwrap_or_default();

        let mut removed = Vec::new();
        for thumbnail in self.records.thumbnails_for(image.id).await {
            if allowed.contains(&thumbnail.height) {
                continue;
            }
            if let Some(asset) = self
                .records
                .remove_thumbnail(image.id, thumbnail.height)
                .await
            {
                self.discard_blob(&asset.file).await;
                removed.push(asset.height);
            }
        }

        if !removed.is_empty() {
            info!(image_id = %image.id, heights = ?removed, "Removed stale thumbnails");
        }

        Ok(removed)
    }

    /// Best-effort blob removal; failures only leave an orphaned blob.
    pub(crate) async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Failed to delete blob");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
