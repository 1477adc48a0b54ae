//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                             - Health check
//! /img/{id}/                                          - Original (owner's tier)
//! /img/thumb/{id}/                                    - Thumbnail (owner's tier)
//! /img/temp/{id}/                                     - Expiring link
//! /api/images                                         - GET list, POST upload
//! /api/images/{id}                                    - GET, PUT replace, DELETE
//! /api/images/{id}/expiring-images                    - GET list, POST create
//! /api/images/{id}/expiring-images/{link_id}          - GET, PATCH
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tiered_images::server::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(services, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use http::header::{HeaderName, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_link_handler, delete_image_handler, expiring_handler, get_image_handler,
    get_link_handler, health_handler, list_images_handler, list_links_handler, original_handler,
    replace_image_handler, thumbnail_handler, update_link_handler, upload_image_handler, AppState,
};
use super::identity::USER_ID_HEADER;
use crate::service::Services;

/// Default request body limit for uploads (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for originals and thumbnails
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    /// - Uploads are capped at 20 MiB
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router over `services`.
pub fn create_router(services: Services, config: RouterConfig) -> Router {
    let app_state = AppState::with_cache_max_age(services, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // Asset URLs are addressed both with and without the trailing slash
    let asset_routes = Router::new()
        .route("/img/{id}/", get(original_handler))
        .route("/img/{id}", get(original_handler))
        .route("/img/thumb/{id}/", get(thumbnail_handler))
        .route("/img/thumb/{id}", get(thumbnail_handler))
        .route("/img/temp/{id}/", get(expiring_handler))
        .route("/img/temp/{id}", get(expiring_handler));

    let api_routes = Router::new()
        .route(
            "/api/images",
            get(list_images_handler).post(upload_image_handler),
        )
        .route(
            "/api/images/{id}",
            get(get_image_handler)
                .put(replace_image_handler)
                .delete(delete_image_handler),
        )
        .route(
            "/api/images/{id}/expiring-images",
            get(list_links_handler).post(create_link_handler),
        )
        .route(
            "/api/images/{id}/expiring-images/{link_id}",
            get(get_link_handler).patch(update_link_handler),
        )
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(asset_routes)
        .merge(api_routes)
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
