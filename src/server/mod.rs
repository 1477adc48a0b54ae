//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /img/...  (bytes)          /api/images/...  (JSON)       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │  identity   │  │        routes           │  │
//! │  │ (requests)  │  │ (x-user-id) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    service::Services
//! ```

pub mod handlers;
pub mod identity;
pub mod routes;

pub use handlers::{
    health_handler, ApiError, AppState, ErrorResponse, ExpireAfterBody, HealthResponse,
    ImageResponse, LinkResponse, LinksQueryParams, ThumbnailResponse, WriteResponse,
};
pub use identity::{RequestOrigin, RequestUser, FORWARDED_PROTO_HEADER, USER_ID_HEADER};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
