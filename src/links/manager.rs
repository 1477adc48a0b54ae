use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{EntityKind, ServiceError, ValidationError};
use crate::records::{ExpiringLink, Image, RecordStore};
use crate::service::missing_blob;
use crate::store::AssetStore;
use crate::tier::{AccessGate, TierCatalog, UserId};

/// Default shortest allowed link lifetime, in seconds.
pub const DEFAULT_EXPIRE_AFTER_MIN: u32 = 300;

/// Default longest allowed link lifetime, in seconds.
pub const DEFAULT_EXPIRE_AFTER_MAX: u32 = 30_000;

const NOT_OWNER_MESSAGE: &str = "You do not own this image";

// =============================================================================
// Bounds and filters
// =============================================================================

/// Inclusive range of accepted `expire_after` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryBounds {
    pub min: u32,
    pub max: u32,
}

impl ExpiryBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Accept `value` if it lies within `[min, max]`.
    pub fn check(&self, value: i64) -> Result<u32, ValidationError> {
        match u32::try_from(value) {
            Ok(v) if v >= self.min && v <= self.max => Ok(v),
            _ => Err(ValidationError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            }),
        }
    }
}

impl Default for ExpiryBounds {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRE_AFTER_MIN, DEFAULT_EXPIRE_AFTER_MAX)
    }
}

/// Which links a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFilter {
    #[default]
    Active,
    Expired,
    All,
}

impl LinkFilter {
    fn matches(&self, link: &ExpiringLink, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self {
            LinkFilter::Active => !link.is_expired_at(now),
            LinkFilter::Expired => link.is_expired_at(now),
            LinkFilter::All => true,
        }
    }
}

impl FromStr for LinkFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LinkFilter::Active),
            "expired" => Ok(LinkFilter::Expired),
            "all" => Ok(LinkFilter::All),
            other => Err(format!(
                "unknown filter '{}', expected active, expired or all",
                other
            )),
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Lifecycle of expiring links: creation, updates, listing and serving.
///
/// Expiry is derived from the link's creation time and observed lazily on
/// every read; nothing has to run for a link to expire.
pub struct ExpiringLinkManager {
    catalog: Arc<TierCatalog>,
    records: Arc<RecordStore>,
    store: Arc<dyn AssetStore>,
    clock: SharedClock,
    bounds: ExpiryBounds,
}

impl ExpiringLinkManager {
    pub fn new(
        catalog: Arc<TierCatalog>,
        records: Arc<RecordStore>,
        store: Arc<dyn AssetStore>,
        clock: SharedClock,
        bounds: ExpiryBounds,
    ) -> Self {
        Self {
            catalog,
            records,
            store,
            clock,
            bounds,
        }
    }

    pub fn bounds(&self) -> ExpiryBounds {
        self.bounds
    }

    /// Mint a link to `image_id` valid for `expire_after` seconds from now.
    ///
    /// # Errors
    ///
    /// Checked in order: `Forbidden` if the user's tier has no expiring links,
    /// `NotFound` for an unknown image, `Forbidden` if the user does not own
    /// it, `OutOfRange` outside the configured bounds.
    pub async fn create(
        &self,
        image_id: Uuid,
        user: &UserId,
        expire_after: i64,
    ) -> Result<ExpiringLink, ServiceError> {
        self.require_capability(user).await?;
        let image = self.owned_image(image_id, user).await?;
        let expire_after = self.bounds.check(expire_after)?;

        let link = ExpiringLink::new(image.id, self.clock.now(), expire_after);
        self.records.insert_link(link.clone()).await?;

        info!(
            link_id = %link.id,
            image_id = %image.id,
            expire_after,
            expires_at = %link.expires_at(),
            "Expiring link created"
        );
        Ok(link)
    }

    /// Change a link's lifetime. Expiry is recomputed from its original
    /// creation time, never from now.
    ///
    /// An already expired link stays expired and reports `Gone`.
    pub async fn update(
        &self,
        link_id: Uuid,
        user: &UserId,
        expire_after: i64,
    ) -> Result<ExpiringLink, ServiceError> {
        self.require_capability(user).await?;
        let link = self.owned_link(link_id, user).await?;
        let expire_after = self.bounds.check(expire_after)?;

        if link.is_expired_at(self.clock.now()) {
            return Err(ServiceError::Gone {
                kind: EntityKind::ExpiringLink,
                id: link.id.to_string(),
                expired_at: link.expires_at(),
            });
        }

        let link = self
            .records
            .set_link_expire_after(link.id, expire_after)
            .await?;

        debug!(link_id = %link.id, expire_after, expires_at = %link.expires_at(), "Expiring link updated");
        Ok(link)
    }

    /// One of `user`'s links.
    pub async fn get(&self, link_id: Uuid, user: &UserId) -> Result<ExpiringLink, ServiceError> {
        self.require_capability(user).await?;
        self.owned_link(link_id, user).await
    }

    /// Links of an image matching `filter`, latest expiry first.
    ///
    /// The current time is read once, so every link is classified against the
    /// same instant.
    pub async fn list(
        &self,
        image_id: Uuid,
        user: &UserId,
        filter: LinkFilter,
    ) -> Result<impl Iterator<Item = ExpiringLink>, ServiceError> {
        self.require_capability(user).await?;
        let image = self.owned_image(image_id, user).await?;

        let now = self.clock.now();
        Ok(self
            .records
            .links_for(image.id)
            .await
            .into_iter()
            .filter(move |link| filter.matches(link, now)))
    }

    pub async fn list_active(
        &self,
        image_id: Uuid,
        user: &UserId,
    ) -> Result<impl Iterator<Item = ExpiringLink>, ServiceError> {
        self.list(image_id, user, LinkFilter::Active).await
    }

    pub async fn list_expired(
        &self,
        image_id: Uuid,
        user: &UserId,
    ) -> Result<impl Iterator<Item = ExpiringLink>, ServiceError> {
        self.list(image_id, user, LinkFilter::Expired).await
    }

    /// Active links of an image, without any capability check.
    ///
    /// Used when rendering an image for a caller whose access was already
    /// decided.
    pub async fn active_for_image(&self, image_id: Uuid) -> Vec<ExpiringLink> {
        let now = self.clock.now();
        self.records
            .links_for(image_id)
            .await
            .into_iter()
            .filter(|link| !link.is_expired_at(now))
            .collect()
    }

    /// Bytes of the original behind a link.
    ///
    /// `NotFound` for an unknown link, `Forbidden` if the image owner's tier
    /// no longer allows expiring links, `Gone` once the link has expired.
    pub async fn resolve_for_serve(&self, link_id: Uuid) -> Result<Bytes, ServiceError> {
        let link = self
            .records
            .link(link_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::ExpiringLink, link_id))?;

        let image = self
            .records
            .image(link.image_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::ExpiringLink, link_id))?;

        let caps = self.catalog.capabilities_for_user(&image.owner).await?;
        AccessGate::require_expiring(caps.as_ref())?;

        if link.is_expired_at(self.clock.now()) {
            return Err(ServiceError::Gone {
                kind: EntityKind::ExpiringLink,
                id: link.id.to_string(),
                expired_at: link.expires_at(),
            });
        }

        self.store
            .get(&image.file)
            .await
            .map_err(missing_blob(EntityKind::ExpiringLink, link_id))
    }

    /// Delete expired link records. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self
            .records
            .remove_links_where(|link| link.is_expired_at(now))
            .await;
        if removed > 0 {
            info!(removed, "Purged expired links");
        }
        removed
    }

    // =========================================================================
    // Gating
    // =========================================================================

    async fn require_capability(&self, user: &UserId) -> Result<(), ServiceError> {
        let caps = self.catalog.capabilities_for_user(user).await?;
        AccessGate::require_expiring(caps.as_ref())
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

    async fn owned_link(&self, link_id: Uuid, user: &UserId) -> Result<ExpiringLink, ServiceError> {
        let not_found = || ServiceError::not_found(EntityKind::ExpiringLink, link_id);

        let link = self.records.link(link_id).await.ok_or_else(not_found)?;
        match self.records.image(link.image_id).await {
            Some(image) if &image.owner == user => Ok(link),
            _ => Err(not_found()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
