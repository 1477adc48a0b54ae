//! Image upload, replacement, listing and serving.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::missing_blob;
use super::orchestrator::{AssetOrchestrator, OrchestrationReport};
use crate::clock::SharedClock;
use crate::error::{EntityKind, ServiceError, ValidationError};
use crate::records::{Image, RecordStore, ThumbnailAsset};
use crate::store::{random_key, AssetKind, AssetStore};
use crate::thumbnail::{ImageProbe, MaxHeightCache, ThumbnailEngine};
use crate::tier::{AccessGate, Capabilities, TierCatalog, UserId};

/// Message returned when a user touches an image they do not own.
const NOT_OWNER_MESSAGE: &str = "You do not own this image";

/// Result of an upload or replacement.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub image: Image,
    pub report: OrchestrationReport,
}

/// Entry point for everything that reads or writes images.
pub struct ImageService {
    catalog: Arc<TierCatalog>,
    records: Arc<RecordStore>,
    store: Arc<dyn AssetStore>,
    orchestrator: Arc<AssetOrchestrator>,
    height_cache: Arc<MaxHeightCache>,
    engine: ThumbnailEngine,
    clock: SharedClock,
}

impl ImageService {
    pub fn new(
        catalog: Arc<TierCatalog>,
        records: Arc<RecordStore>,
        store: Arc<dyn AssetStore>,
        orchestrator: Arc<AssetOrchestrator>,
        height_cache: Arc<MaxHeightCache>,
        clock: SharedClock,
    ) -> Self {
        Self {
            catalog,
            records,
            store,
            orchestrator,
            height_cache,
            engine: ThumbnailEngine::new(),
            clock,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upload a new image for `user` and generate its thumbnails.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Decode`] if the bytes are not a readable image
    /// - [`ValidationError::ImageTooSmall`] if the image is shorter than the
    ///   largest configured thumbnail height
    ///
    /// Both are checked before anything is written. If thumbnail generation
    /// fails as a whole, the new record and blob are removed again.
    pub async fn upload(&self, user: &UserId, bytes: Bytes) -> Result<WriteOutcome, ServiceError> {
        let probe = self.validate(&bytes).await?;

        let key = random_key(AssetKind::Original, probe.extension());
        self.store.put(&key, bytes).await?;

        let now = self.clock.now();
        let image = Image {
            id: Uuid::new_v4(),
            owner: user.clone(),
            created_at: now,
            updated_at: now,
            file: key,
            width: probe.width,
            height: probe.height,
        };
        self.records.insert_image(image.clone()).await;

        info!(
            image_id = %image.id,
            user = %user,
            width = image.width,
            height = image.height,
            "Image uploaded"
        );

        let report = match self.orchestrator.on_image_write(&image, None).await {
            Ok(report) => report,
            Err(e) => {
                warn!(image_id = %image.id, error = %e, "Thumbnail generation failed, rolling back upload");
                if let Some(deleted) = self.records.delete_image(image.id).await {
                    for key in deleted.blob_keys() {
                        self.orchestrator.discard_blob(key).await;
                    }
                }
                return Err(e);
            }
        };
        Ok(WriteOutcome { image, report })
    }

    /// Replace the bytes of an existing image and regenerate its thumbnails.
    ///
    /// The superseded original blob is removed once the new thumbnails are in
    /// place. If thumbnail generation fails as a whole, the record is restored
    /// to the previous file.
    pub async fn replace(
        &self,
        image_id: Uuid,
        user: &UserId,
        bytes: Bytes,
    ) -> Result<WriteOutcome, ServiceError> {
        let existing = self.owned_image(image_id, user).await?;
        let probe = self.validate(&bytes).await?;

        let key = random_key(AssetKind::Original, probe.extension());
        self.store.put(&key, bytes).await?;

        let image = Image {
            file: key,
            width: probe.width,
            height: probe.height,
            updated_at: self.clock.now(),
            ..existing
        };
        let previous = match self.records.update_image(image.clone()).await {
            Ok(previous) => previous,
            Err(e) => {
                self.orchestrator.discard_blob(&image.file).await;
                return Err(e);
            }
        };

        let report = match self
            .orchestrator
            .on_image_write(&image, Some(&previous.file))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(image_id = %image.id, error = %e, "Thumbnail generation failed, restoring previous file");
                if let Err(restore) = self.records.update_image(previous).await {
                    debug!(image_id = %image.id, error = %restore, "Image deleted during replace");
                }
                self.orchestrator.discard_blob(&image.file).await;
                return Err(e);
            }
        };

        if previous.file != image.file {
            self.orchestrator.discard_blob(&previous.file).await;
        }

        info!(image_id = %image.id, user = %user, "Image replaced");
        Ok(WriteOutcome { image, report })
    }

    /// Delete an image with its thumbnails, links and blobs.
    pub async fn delete(&self, image_id: Uuid, user: &UserId) -> Result<(), ServiceError> {
        self.owned_image(image_id, user).await?;

        let Some(deleted) = self.records.delete_image(image_id).await else {
            return Err(ServiceError::not_found(EntityKind::Image, image_id));
        };

        for key in deleted.blob_keys() {
            self.orchestrator.discard_blob(key).await;
        }

        info!(
            image_id = %image_id,
            thumbnails = deleted.thumbnails.len(),
            links = deleted.links.len(),
            "Image deleted"
        );
        Ok(())
    }

    async fn validate(&self, bytes: &[u8]) -> Result<ImageProbe, ServiceError> {
        let probe = self.engine.probe(bytes)?;

        let required = self
            .height_cache
            .get_or_compute(|| self.catalog.max_thumbnail_height())
            .await;

        if let Some(required) = required {
            if probe.height < required {
                debug!(required, actual = probe.height, "Rejected image below minimum height");
                return Err(ValidationError::ImageTooSmall {
                    required,
                    actual: probe.height,
                }
                .into());
            }
        }

        Ok(probe)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Images owned by `user`, newest upload first.
    pub async fn list_for_user(&self, user: &UserId) -> impl Iterator<Item = Image> {
        self.records.images_for_owner(user).await.into_iter()
    }

    /// One of `user`'s images. Other users' images are reported as not found.
    pub async fn get_for_user(&self, image_id: Uuid, user: &UserId) -> Result<Image, ServiceError> {
        match self.records.image(image_id).await {
            Some(image) if &image.owner == user => Ok(image),
            _ => Err(ServiceError::not_found(EntityKind::Image, image_id)),
        }
    }

    /// Thumbnails recorded for an image, ordered by height.
    pub async fn thumbnails_for(&self, image_id: Uuid) -> Vec<ThumbnailAsset> {
        self.records.thumbnails_for(image_id).await
    }

    /// Capabilities of `user`'s tier, `None` when unbound.
    pub async fn capabilities_for(&self, user: &UserId) -> Result<Option<Capabilities>, ServiceError> {
        Ok(self.catalog.capabilities_for_user(user).await?)
    }

    /// Bytes of an original, gated on the owner's tier.
    pub async fn serve_original(&self, image_id: Uuid) -> Result<Bytes, ServiceError> {
        let image = self
            .records
            .image(image_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Image, image_id))?;

        let caps = self.catalog.capabilities_for_user(&image.owner).await?;
        AccessGate::require_original(caps.as_ref())?;

        self.store
            .get(&image.file)
            .await
            .map_err(missing_blob(EntityKind::Image, image_id))
    }

    /// Bytes of a thumbnail, gated on the owner's allowed heights.
    pub async fn serve_thumbnail(&self, thumbnail_id: Uuid) -> Result<Bytes, ServiceError> {
        let thumbnail = self
            .records
            .thumbnail(thumbnail_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Thumbnail, thumbnail_id))?;

        let image = self
            .records
            .image(thumbnail.image_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Thumbnail, thumbnail_id))?;

        let caps = self.catalog.capabilities_for_user(&image.owner).await?;
        AccessGate::require_thumbnail(caps.as_ref(), thumbnail.height)?;

        self.store
            .get(&thumbnail.file)
            .await
            .map_err(missing_blob(EntityKind::Thumbnail, thumbnail_id))
    }

    async fn owned_image(&self, image_id: Uuid, user: &UserId) -> Result<Image, ServiceError> {
        let image = self
            .records
            .image(image_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Image, image_id))?;

        if &image.owner != user {
            return Err(ServiceError::forbidden(NOT_OWNER_MESSAGE));
        }
        Ok(image)
    }
}

// =============================================================================
// Tests
// =============================================================================
