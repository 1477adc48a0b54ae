//! Shared helpers for unit tests.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::clock::{ManualClock, SharedClock};
use crate::service::{ServiceSettings, Services};
use crate::store::{AssetStore, MemoryAssetStore};
use crate::tier::UserId;

/// A `width` x `height` PNG with a deterministic gradient.
pub(crate) fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// Services over an in-memory store, with built-in tiers and a frozen clock.
pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryAssetStore>,
    pub services: Services,
}

impl Harness {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryAssetStore::new());

        let shared_clock: SharedClock = clock.clone();
        let shared_store: Arc<dyn AssetStore> = store.clone();
        let services = Services::new(shared_store, shared_clock, ServiceSettings::default());
        services.catalog.seed_builtin().await;

        Self {
            clock,
            store,
            services,
        }
    }

    /// Bind a fresh user to `tier`.
    pub async fn user(&self, name: &str, tier: &str) -> UserId {
        let user = UserId::new(name);
        self.services
            .catalog
            .bind_user(user.clone(), tier)
            .await
            .unwrap();
        user
    }
}
