//! Account tiers and access control.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │        TierCatalog          │  tiers, thumbnail specs, M:N join,
//! │                             │  user -> tier bindings
//! └──────────────┬──────────────┘
//!                │ Capabilities
//!                ▼
//! ┌─────────────────────────────┐
//! │        AccessGate           │  pure allow/deny predicates
//! └─────────────────────────────┘
//! ```

mod catalog;
mod gate;

pub use catalog::{
    AccountTier, Capabilities, ThumbnailSpec, TierCatalog, UserId, BASIC_TIER, BUILTIN_HEIGHTS,
    ENTERPRISE_TIER, PREMIUM_TIER,
};
pub use gate::{AccessGate, UPGRADE_ACCOUNT_TIER_MESSAGE};
