//! Persistent records for images, thumbnails and expiring links.
//!
//! Records live in memory behind a single `RwLock` so that keyed upserts and
//! cascade deletes are atomic with respect to each other.
//!
//! # Invariants
//!
//! - At most one [`ThumbnailAsset`] per `(image_id, height)`.
//! - Thumbnails and links never outlive their image.

mod entities;

pub use entities::{ExpiringLink, Image, ThumbnailAsset};

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EntityKind, ServiceError};
use crate::tier::UserId;

/// Result of a keyed thumbnail upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub asset: ThumbnailAsset,

    /// Storage key of the blob the upsert replaced
    pub superseded: Option<String>,
}

/// Everything removed by a cascading image delete.
#[derive(Debug, Clone)]
pub struct DeletedImage {
    pub image: Image,
    pub thumbnails: Vec<ThumbnailAsset>,
    pub links: Vec<ExpiringLink>,
}

impl DeletedImage {
    /// Storage keys of every blob owned by the deleted records.
    pub fn blob_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.image.file.as_str())
            .chain(self.thumbnails.iter().map(|t| t.file.as_str()))
    }
}

#[derive(Default)]
struct Records {
    images: HashMap<Uuid, Image>,
    thumbnails: HashMap<Uuid, ThumbnailAsset>,
    thumbnail_index: HashMap<(Uuid, u32), Uuid>,
    links: HashMap<Uuid, ExpiringLink>,
}

/// In-memory record store.
#[derive(Default)]
pub struct RecordStore {
    state: RwLock<Records>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Images
    // =========================================================================

    pub async fn insert_image(&self, image: Image) {
        self.state.write().await.images.insert(image.id, image);
    }

    pub async fn image(&self, id: Uuid) -> Option<Image> {
        self.state.read().await.images.get(&id).cloned()
    }

    /// Replace an existing image record. Returns the previous record.
    pub async fn update_image(&self, image: Image) -> Result<Image, ServiceError> {
        let mut state = self.state.write().await;
        match state.images.get_mut(&image.id) {
            Some(existing) => Ok(std::mem::replace(existing, image)),
            None => Err(ServiceError::not_found(EntityKind::Image, image.id)),
        }
    }

    /// Images owned by `owner`, newest upload first.
    pub async fn images_for_owner(&self, owner: &UserId) -> Vec<Image> {
        let state = self.state.read().await;
        let mut images: Vec<_> = state
            .images
            .values()
            .filter(|image| &image.owner == owner)
            .cloned()
            .collect();
        images.sort_by_key(|image| (Reverse(image.created_at), image.id));
        images
    }

    /// Delete an image together with its thumbnails and links.
    pub async fn delete_image(&self, id: Uuid) -> Option<DeletedImage> {
        let mut state = self.state.write().await;
        let image = state.images.remove(&id)?;

        let thumbnail_ids: Vec<Uuid> = state
            .thumbnails
            .values()
            .filter(|t| t.image_id == id)
            .map(|t| t.id)
            .collect();

        let mut thumbnails = Vec::with_capacity(thumbnail_ids.len());
        for thumbnail_id in thumbnail_ids {
            if let Some(thumbnail) = state.thumbnails.remove(&thumbnail_id) {
                state.thumbnail_index.remove(&(id, thumbnail.height));
                thumbnails.push(thumbnail);
            }
        }
        thumbnails.sort_by_key(|t| t.height);

        let mut links = Vec::new();
        state.links.retain(|_, link| {
            if link.image_id == id {
                links.push(link.clone());
                false
            } else {
                true
            }
        });

        Some(DeletedImage {
            image,
            thumbnails,
            links,
        })
    }

    // =========================================================================
    // Thumbnails
    // =========================================================================

    /// Insert or update the thumbnail of `image_id` at `height`.
    ///
    /// An existing asset keeps its id and `created_at`; its file, width and
    /// `updated_at` are replaced and the old file key is returned as
    /// `superseded`. Fails with `NotFound` if the image has been deleted.
    pub async fn upsert_thumbnail(
        &self,
        image_id: Uuid,
        height: u32,
        width: u32,
        file: String,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, ServiceError> {
        let mut state = self.state.write().await;
        if !state.images.contains_key(&image_id) {
            return Err(ServiceError::not_found(EntityKind::Image, image_id));
        }

        let existing_id = state.thumbnail_index.get(&(image_id, height)).copied();
        if let Some(existing) = existing_id.and_then(|id| state.thumbnails.get_mut(&id)) {
            let superseded = std::mem::replace(&mut existing.file, file);
            existing.width = width;
            existing.updated_at = now;
            return Ok(UpsertOutcome {
                asset: existing.clone(),
                superseded: Some(superseded).filter(|old| *old != existing.file),
            });
        }

        let asset = ThumbnailAsset {
            id: Uuid::new_v4(),
            image_id,
            height,
            width,
            file,
            created_at: now,
            updated_at: now,
        };
        state.thumbnail_index.insert((image_id, height), asset.id);
        state.thumbnails.insert(asset.id, asset.clone());

        Ok(UpsertOutcome {
            asset,
            superseded: None,
        })
    }

    pub async fn thumbnail(&self, id: Uuid) -> Option<ThumbnailAsset> {
        self.state.read().await.thumbnails.get(&id).cloned()
    }

    /// Thumbnails of an image, ordered by height.
    pub async fn thumbnails_for(&self, image_id: Uuid) -> Vec<ThumbnailAsset> {
        let state = self.state.read().await;
        let mut thumbnails: Vec<_> = state
            .thumbnails
            .values()
            .filter(|t| t.image_id == image_id)
            .cloned()
            .collect();
        thumbnails.sort_by_key(|t| t.height);
        thumbnails
    }

    pub async fn remove_thumbnail(&self, image_id: Uuid, height: u32) -> Option<ThumbnailAsset> {
        let mut state = self.state.write().await;
        let id = state.thumbnail_index.remove(&(image_id, height))?;
        state.thumbnails.remove(&id)
    }

    // =========================================================================
    // Expiring links
    // =========================================================================

    /// Persist a new link. Fails with `NotFound` if its image has been deleted.
    pub async fn insert_link(&self, link: ExpiringLink) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if !state.images.contains_key(&link.image_id) {
            return Err(ServiceError::not_found(EntityKind::Image, link.image_id));
        }
        state.links.insert(link.id, link);
        Ok(())
    }

    pub async fn link(&self, id: Uuid) -> Option<ExpiringLink> {
        self.state.read().await.links.get(&id).cloned()
    }

    /// Change a link's lifetime in place and return the updated record.
    ///
    /// Expiry is recomputed from the stored `created_at`.
    pub async fn set_link_expire_after(
        &self,
        id: Uuid,
        expire_after_seconds: u32,
    ) -> Result<ExpiringLink, ServiceError> {
        let mut state = self.state.write().await;
        match state.links.get_mut(&id) {
            Some(link) => {
                link.set_expire_after(expire_after_seconds);
                Ok(link.clone())
            }
            None => Err(ServiceError::not_found(EntityKind::ExpiringLink, id)),
        }
    }

    /// Links of an image, latest expiry first, then latest creation first.
    pub async fn links_for(&self, image_id: Uuid) -> Vec<ExpiringLink> {
        let state = self.state.read().await;
        let mut links: Vec<_> = state
            .links
            .values()
            .filter(|l| l.image_id == image_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| (Reverse(l.expires_at()), Reverse(l.created_at()), l.id));
        links
    }

    /// Delete every link matching `predicate`. Returns the number removed.
    pub async fn remove_links_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&ExpiringLink) -> bool,
    {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state.links.retain(|_, link| !predicate(link));
        before - state.links.len()
    }
}
