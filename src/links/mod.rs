//! Expiring links to originals.
//!
//! ```text
//!            create(expire_after)
//!                  │
//!                  ▼
//!   ┌──────────────────────────┐   now > expires_at   ┌──────────┐
//!   │ Active                   │ ───────────────────► │ Expired  │
//!   │ now <= created_at + n    │                      │ (410)    │
//!   └──────────────────────────┘                      └──────────┘
//! ```
//!
//! The transition is one-way and purely time-driven.

mod manager;

pub use manager::{
    ExpiringLinkManager, ExpiryBounds, LinkFilter, DEFAULT_EXPIRE_AFTER_MAX,
    DEFAULT_EXPIRE_AFTER_MIN,
};
