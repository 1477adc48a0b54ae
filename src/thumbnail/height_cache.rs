//! Cached maximum thumbnail height.
//!
//! Upload validation needs the largest configured thumbnail height on every
//! write. The value only changes when thumbnail specs change, so it is kept
//! for a TTL and dropped explicitly by the catalog on spec changes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::SharedClock;

/// Default time a computed value stays valid.
pub const DEFAULT_MAX_HEIGHT_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy)]
struct CachedHeight {
    value: Option<u32>,
    stored_at: DateTime<Utc>,
}

/// Get-or-compute cache for a single value with a time-to-live.
pub struct MaxHeightCache {
    entry: RwLock<Option<CachedHeight>>,

    /// Bumped by every invalidation, under the entry write lock
    generation: AtomicU64,

    ttl: Duration,
    clock: SharedClock,
}

impl MaxHeightCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entry: RwLock::new(None),
            generation: AtomicU64::new(0),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, or run `compute` and cache its result.
    ///
    /// A value is fresh while `now - stored_at < ttl`. Concurrent misses may
    /// each compute; the last write wins. A result computed across an
    /// [`invalidate`](Self::invalidate) is returned but not stored.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> Option<u32>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<u32>>,
    {
        let now = self.clock.now();

        if let Some(cached) = *self.entry.read().await {
            if now - cached.stored_at < self.ttl {
                return cached.value;
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let value = compute().await;
        debug!(max_height = ?value, "Recomputed max thumbnail height");

        let mut entry = self.entry.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            *entry = Some(CachedHeight {
                value,
                stored_at: now,
            });
        } else {
            debug!("Invalidated during recompute, not caching");
        }

        value
    }

    /// Drop the cached value so the next read recomputes it.
    pub async fn invalidate(&self) {
        let mut entry = self.entry.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *entry = None;
    }
}
