//! Test utilities for integration tests.
//!
//! Builds a router over in-memory storage with a frozen clock, plus helpers to
//! fabricate images and issue requests.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use tiered_images::server::USER_ID_HEADER;
use tiered_images::{
    create_router, AssetStore, ManualClock, MemoryAssetStore, RouterConfig, ServiceSettings,
    Services, SharedClock, UserId,
};

// =============================================================================
// Test Server
// =============================================================================

/// A router plus handles on everything behind it.
pub struct TestServer {
    pub router: Router,
    pub services: Services,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryAssetStore>,
}

impl TestServer {
    /// Built-in tiers seeded, clock frozen at 2024-05-01 12:00 UTC.
    pub async fn new() -> Self {
        Self::with_config(RouterConfig::new().with_tracing(false)).await
    }

    pub async fn with_config(config: RouterConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryAssetStore::new());

        let shared_clock: SharedClock = clock.clone();
        let shared_store: Arc<dyn AssetStore> = store.clone();
        let services = Services::new(shared_store, shared_clock, ServiceSettings::default());
        services.catalog.seed_builtin().await;

        let router = create_router(services.clone(), config);

        Self {
            router,
            services,
            clock,
            store,
        }
    }

    /// Bind `name` to `tier` and return the id.
    pub async fn user(&self, name: &str, tier: &str) -> UserId {
        let user = UserId::new(name);
        self.services
            .catalog
            .bind_user(user.clone(), tier)
            .await
            .unwrap();
        user
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Upload `bytes` as `user`, asserting success, and return the JSON body.
    pub async fn upload(&self, user: &UserId, bytes: Bytes) -> Value {
        let response = self.send(upload_request(Some(user), bytes)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn get(uri: &str, user: Option<&UserId>) -> Request<Body> {
    with_user(Request::builder().method("GET").uri(uri), user)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str, user: Option<&UserId>) -> Request<Body> {
    with_user(Request::builder().method("DELETE").uri(uri), user)
        .body(Body::empty())
        .unwrap()
}

pub fn upload_request(user: Option<&UserId>, bytes: Bytes) -> Request<Body> {
    with_user(Request::builder().method("POST").uri("/api/images"), user)
        .header("content-type", "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

pub fn put_bytes(uri: &str, user: Option<&UserId>, bytes: Bytes) -> Request<Body> {
    with_user(Request::builder().method("PUT").uri(uri), user)
        .header("content-type", "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, user: Option<&UserId>, body: Value) -> Request<Body> {
    with_user(Request::builder().method(method).uri(uri), user)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_user(builder: axum::http::request::Builder, user: Option<&UserId>) -> axum::http::request::Builder {
    let builder = builder.header("host", "images.test");
    match user {
        Some(user) => builder.header(USER_ID_HEADER, user.as_str()),
        None => builder,
    }
}

// =============================================================================
// Responses
// =============================================================================

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

/// Strip scheme and host from an absolute URL returned by the API.
pub fn path_of(url: &str) -> String {
    url.strip_prefix("http://images.test")
        .unwrap_or(url)
        .to_string()
}

// =============================================================================
// Image Fixtures
// =============================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    })
}

/// A `width` x `height` PNG.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(gradient(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// A `width` x `height` baseline JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(gradient(width, height)))
        .unwrap();
    Bytes::from(buf)
}

/// Decode dimensions of served bytes.
pub fn dimensions_of(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}
