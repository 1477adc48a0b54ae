use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::tier::UserId;
use crate::urls;

/// An uploaded original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: Uuid,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Storage key of the original bytes
    pub file: String,

    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn url(&self) -> String {
        urls::original_url(self.id)
    }
}

/// One derived thumbnail of an image at a configured height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailAsset {
    pub id: Uuid,
    pub image_id: Uuid,
    pub height: u32,
    pub width: u32,

    /// Storage key of the rendered bytes
    pub file: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThumbnailAsset {
    pub fn url(&self) -> String {
        urls::thumbnail_url(self.id)
    }
}

/// A time-bounded handle to an image's original.
///
/// The timing fields are private: `created_at` is fixed at construction and
/// `expires_at` is only ever derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiringLink {
    pub id: Uuid,
    pub image_id: Uuid,
    created_at: DateTime<Utc>,
    expire_after_seconds: u32,

    /// Always `created_at + expire_after_seconds`
    expires_at: DateTime<Utc>,
}

impl ExpiringLink {
    /// Create a link whose lifetime starts at `created_at`.
    pub fn new(image_id: Uuid, created_at: DateTime<Utc>, expire_after_seconds: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_id,
            created_at,
            expire_after_seconds,
            expires_at: expiration(created_at, expire_after_seconds),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expire_after_seconds(&self) -> u32 {
        self.expire_after_seconds
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Change the lifetime, recomputing expiry from the original creation time.
    pub fn set_expire_after(&mut self, expire_after_seconds: u32) {
        self.expire_after_seconds = expire_after_seconds;
        self.expires_at = expiration(self.created_at, expire_after_seconds);
    }

    /// Expired strictly after `expires_at`; at the boundary the link is still active.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn url(&self) -> String {
        urls::expiring_url(self.id)
    }
}

fn expiration(created_at: DateTime<Utc>, expire_after_seconds: u32) -> DateTime<Utc> {
    created_at + Duration::seconds(i64::from(expire_after_seconds))
}
