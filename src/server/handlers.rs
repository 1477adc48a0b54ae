//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /img/{id}/`, `/img/thumb/{id}/`, `/img/temp/{id}/` - Serve asset bytes
//! - `/api/images[/{id}[/expiring-images[/{link_id}]]]` - JSON API

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::identity::{RequestOrigin, RequestUser};
use crate::error::{ServiceError, StoreError, ValidationError};
use crate::links::LinkFilter;
use crate::records::{ExpiringLink, Image, ThumbnailAsset};
use crate::service::{OrchestrationReport, Services};
use crate::tier::{AccessGate, Capabilities, UserId};
use crate::urls::parse_asset_id;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,

    /// Cache-Control max-age for served originals and thumbnails, in seconds
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            cache_max_age: 3600,
        }
    }

    pub fn with_cache_max_age(services: Services, cache_max_age: u32) -> Self {
        Self {
            services,
            cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for listing expiring links.
#[derive(Debug, Deserialize)]
pub struct LinksQueryParams {
    /// `active` (default), `expired` or `all`
    #[serde(default)]
    pub show: Option<String>,
}

/// Body for creating or updating an expiring link.
#[derive(Debug, Deserialize)]
pub struct ExpireAfterBody {
    /// Lifetime in seconds
    pub expire_after: i64,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "forbidden")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailResponse {
    pub id: Uuid,
    pub height: u32,
    pub width: u32,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub id: Uuid,
    pub image: Uuid,
    pub link: String,
    pub created_at: DateTime<Utc>,
    pub expire_after: u32,
    pub expires_at: DateTime<Utc>,
}

/// An image as its owner's tier is allowed to see it.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,

    /// Present only when the tier allows originals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Only heights in the tier's allowed set
    pub thumbnails: Vec<ThumbnailResponse>,

    /// Active links, present only when the tier allows expiring links
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiring_images: Option<Vec<LinkResponse>>,
}

/// Response to an upload or replacement.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    #[serde(flatten)]
    pub image: ImageResponse,

    /// Heights that could not be generated
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_heights: Vec<u32>,
}

fn link_response(link: &ExpiringLink, origin: &RequestOrigin) -> LinkResponse {
    LinkResponse {
        id: link.id,
        image: link.image_id,
        link: origin.url(&link.url()),
        created_at: link.created_at(),
        expire_after: link.expire_after_seconds(),
        expires_at: link.expires_at(),
    }
}

fn thumbnail_response(thumbnail: &ThumbnailAsset, origin: &RequestOrigin) -> ThumbnailResponse {
    ThumbnailResponse {
        id: thumbnail.id,
        height: thumbnail.height,
        width: thumbnail.width,
        url: origin.url(&thumbnail.url()),
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No authenticated user on a request that needs one
    #[error("Authentication required")]
    Unauthenticated,

    /// Path segment is not a version-4 UUID
    #[error("Not found")]
    InvalidId,

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::InvalidId => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Service(err) => match err {
                ServiceError::Validation(ValidationError::ImageTooSmall { .. }) => {
                    (StatusCode::BAD_REQUEST, "image_too_small")
                }
                ServiceError::Validation(ValidationError::OutOfRange { .. }) => {
                    (StatusCode::BAD_REQUEST, "out_of_range")
                }
                ServiceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
                ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                ServiceError::Gone { .. } => (StatusCode::GONE, "expired"),
                ServiceError::Decode(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
                ServiceError::UnknownTier(_) => (StatusCode::INTERNAL_SERVER_ERROR, "unknown_tier"),
                ServiceError::Catalog(_) => (StatusCode::CONFLICT, "catalog_conflict"),
                ServiceError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
                ServiceError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            },
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// Errors are logged by severity:
/// - 5xx errors at ERROR level
/// - 404s at DEBUG level (common and expected)
/// - other 4xx errors at WARN level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

fn asset_id(segment: &str) -> Result<Uuid, ApiError> {
    parse_asset_id(segment).ok_or(ApiError::InvalidId)
}

// =============================================================================
// Handlers - assets
// =============================================================================

/// Handle health check requests.
///
/// `GET /health` returns `200 OK` with `{"status": "healthy", "version": "..."}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /img/{id}/` - the original, if the owner's tier allows originals.
pub async fn original_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = asset_id(&id)?;
    let bytes = state.services.images.serve_original(id).await?;
    Ok(image_response(
        bytes,
        format!("public, max-age={}", state.cache_max_age),
    ))
}

/// `GET /img/thumb/{id}/` - a thumbnail, if its height is in the owner's tier.
pub async fn thumbnail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = asset_id(&id)?;
    let bytes = state.services.images.serve_thumbnail(id).await?;
    Ok(image_response(
        bytes,
        format!("public, max-age={}", state.cache_max_age),
    ))
}

/// `GET /img/temp/{id}/` - the original behind an expiring link.
///
/// `404` for an unknown link, `403` when the owner's tier lost expiring links,
/// `410` once the link has expired.
pub async fn expiring_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = asset_id(&id)?;
    let bytes = state.services.links.resolve_for_serve(id).await?;
    Ok(image_response(bytes, "no-store".to_string()))
}

fn image_response(bytes: Bytes, cache_control: String) -> Response {
    let content_type = image::guess_format(&bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from(bytes),
    )
        .into_response()
}

// =============================================================================
// Handlers - image API
// =============================================================================

/// Render `image` for a caller with `caps`.
async fn image_view(
    state: &AppState,
    image: &Image,
    caps: Option<&Capabilities>,
    origin: &RequestOrigin,
) -> ImageResponse {
    let thumbnails: Vec<ThumbnailResponse> = state
        .services
        .images
        .thumbnails_for(image.id)
        .await
        .iter()
        .filter(|t| AccessGate::can_serve_thumbnail(caps, t.height))
        .map(|t| thumbnail_response(t, origin))
        .collect();

    let expiring_images = if AccessGate::can_serve_expiring(caps) {
        let links = state.services.links.active_for_image(image.id).await;
        Some(links.iter().map(|l| link_response(l, origin)).collect())
    } else {
        None
    };

    ImageResponse {
        id: image.id,
        created_at: image.created_at,
        updated_at: image.updated_at,
        width: image.width,
        height: image.height,
        image_url: AccessGate::can_serve_original(caps).then(|| origin.url(&image.url())),
        thumbnails,
        expiring_images,
    }
}

async fn write_response(
    state: &AppState,
    user: &UserId,
    image: &Image,
    report: &OrchestrationReport,
    origin: &RequestOrigin,
) -> Result<WriteResponse, ApiError> {
    let caps = state.services.images.capabilities_for(user).await?;
    Ok(WriteResponse {
        image: image_view(state, image, caps.as_ref(), origin).await,
        failed_heights: report.failures.iter().map(|f| f.height).collect(),
    })
}

/// `GET /api/images` - the caller's images, newest first.
pub async fn list_images_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    let caps = state.services.images.capabilities_for(&user).await?;

    let mut views = Vec::new();
    for image in state.services.images.list_for_user(&user).await {
        views.push(image_view(&state, &image, caps.as_ref(), &origin).await);
    }
    Ok(Json(views))
}

/// `POST /api/images` - upload raw image bytes.
pub async fn upload_image_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    body: Bytes,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body is empty".to_string()));
    }

    let outcome = state.services.images.upload(&user, body).await?;
    let response = write_response(&state, &user, &outcome.image, &outcome.report, &origin).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /api/images/{id}`
pub async fn get_image_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>, ApiError> {
    let id = asset_id(&id)?;
    let image = state.services.images.get_for_user(id, &user).await?;
    let caps = state.services.images.capabilities_for(&user).await?;
    Ok(Json(image_view(&state, &image, caps.as_ref(), &origin).await))
}

/// `PUT /api/images/{id}` - replace the image bytes.
pub async fn replace_image_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<WriteResponse>, ApiError> {
    let id = asset_id(&id)?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body is empty".to_string()));
    }

    let outcome = state.services.images.replace(id, &user, body).await?;
    let response = write_response(&state, &user, &outcome.image, &outcome.report, &origin).await?;
    Ok(Json(response))
}

/// `DELETE /api/images/{id}`
pub async fn delete_image_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = asset_id(&id)?;
    state.services.images.delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Handlers - expiring links API
// =============================================================================

/// `GET /api/images/{id}/expiring-images?show=active|expired|all`
pub async fn list_links_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path(id): Path<String>,
    Query(query): Query<LinksQueryParams>,
) -> Result<Json<Vec<LinkResponse>>, ApiError> {
    let id = asset_id(&id)?;
    let filter = match query.show.as_deref() {
        Some(show) => show.parse::<LinkFilter>().map_err(ApiError::BadRequest)?,
        None => LinkFilter::default(),
    };

    let links = state.services.links.list(id, &user, filter).await?;
    Ok(Json(links.map(|l| link_response(&l, &origin)).collect()))
}

/// `POST /api/images/{id}/expiring-images` with `{"expire_after": seconds}`
pub async fn create_link_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path(id): Path<String>,
    Json(body): Json<ExpireAfterBody>,
) -> Result<(StatusCode, Json<LinkResponse>), ApiError> {
    let id = asset_id(&id)?;
    let link = state
        .services
        .links
        .create(id, &user, body.expire_after)
        .await?;
    Ok((StatusCode::CREATED, Json(link_response(&link, &origin))))
}

/// `GET /api/images/{id}/expiring-images/{link_id}`
pub async fn get_link_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path((id, link_id)): Path<(String, String)>,
) -> Result<Json<LinkResponse>, ApiError> {
    let (id, link_id) = (asset_id(&id)?, asset_id(&link_id)?);
    let link = state.services.links.get(link_id, &user).await?;
    if link.image_id != id {
        return Err(ApiError::InvalidId);
    }
    Ok(Json(link_response(&link, &origin)))
}

/// `PATCH /api/images/{id}/expiring-images/{link_id}` with `{"expire_after": seconds}`
pub async fn update_link_handler(
    State(state): State<AppState>,
    RequestUser(user): RequestUser,
    origin: RequestOrigin,
    Path((id, link_id)): Path<(String, String)>,
    Json(body): Json<ExpireAfterBody>,
) -> Result<Json<LinkResponse>, ApiError> {
    let (id, link_id) = (asset_id(&id)?, asset_id(&link_id)?);
    let existing = state.services.links.get(link_id, &user).await?;
    if existing.image_id != id {
        return Err(ApiError::InvalidId);
    }

    let link = state
        .services
        .links
        .update(link_id, &user, body.expire_after)
        .await?;
    Ok(Json(link_response(&link, &origin)))
}

// =============================================================================
// Tests
// =============================================================================
