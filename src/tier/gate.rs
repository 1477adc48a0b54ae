//! Capability predicates for serving assets.
//!
//! The gate works on an already-resolved capability bundle and never touches
//! storage. `None` stands for a user without a tier binding and is denied
//! everything.

use crate::error::ServiceError;

use super::catalog::Capabilities;

/// Message returned when a tier lacks a capability.
pub const UPGRADE_ACCOUNT_TIER_MESSAGE: &str = "Upgrade your account tier to access this resource";

/// Allow/deny decisions over a resolved tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    /// Whether the original upload may be served.
    pub fn can_serve_original(caps: Option<&Capabilities>) -> bool {
        caps.is_some_and(|c| c.can_see_original)
    }

    /// Whether a thumbnail of `height` may be served.
    pub fn can_serve_thumbnail(caps: Option<&Capabilities>, height: u32) -> bool {
        caps.is_some_and(|c| c.allowed_heights.contains(&height))
    }

    /// Whether expiring links may be created or served.
    pub fn can_serve_expiring(caps: Option<&Capabilities>) -> bool {
        caps.is_some_and(|c| c.can_see_expiring)
    }

    /// Keep only the heights the tier may see.
    pub fn visible_heights<I>(caps: Option<&Capabilities>, heights: I) -> Vec<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        heights
            .into_iter()
            .filter(|h| Self::can_serve_thumbnail(caps, *h))
            .collect()
    }

    pub fn require_original(caps: Option<&Capabilities>) -> Result<(), ServiceError> {
        if Self::can_serve_original(caps) {
            Ok(())
        } else {
            Err(ServiceError::forbidden(UPGRADE_ACCOUNT_TIER_MESSAGE))
        }
    }

    pub fn require_thumbnail(caps: Option<&Capabilities>, height: u32) -> Result<(), ServiceError> {
        if Self::can_serve_thumbnail(caps, height) {
            Ok(())
        } else {
            Err(ServiceError::forbidden(UPGRADE_ACCOUNT_TIER_MESSAGE))
        }
    }

    pub fn require_expiring(caps: Option<&Capabilities>) -> Result<(), ServiceError> {
        if Self::can_serve_expiring(caps) {
            Ok(())
        } else {
            Err(ServiceError::forbidden(UPGRADE_ACCOUNT_TIER_MESSAGE))
        }
    }
}
