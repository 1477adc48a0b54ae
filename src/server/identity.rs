//! Request identity and origin extractors.
//!
//! Authentication happens upstream; the authenticated user id arrives in the
//! `x-user-id` header. Requests to the JSON API without it are rejected with
//! `401 Unauthorized`. The asset URLs (`/img/...`) need no identity: access is
//! decided by the asset owner's tier.

use axum::extract::FromRequestParts;
use http::header::HOST;
use http::request::Parts;

use super::handlers::ApiError;
use crate::tier::UserId;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the scheme the client used in front of a proxy.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// The authenticated user making the request.
#[derive(Debug, Clone)]
pub struct RequestUser(pub UserId);

impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        Ok(RequestUser(UserId::new(id)))
    }
}

/// Scheme and host the request was addressed to, used to build absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
}

impl RequestOrigin {
    /// Absolute URL for a server-relative `path`.
    pub fn url(&self, path: &str) -> String {
        crate::urls::absolute(&self.scheme, &self.host, path)
    }
}

impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let scheme = header(FORWARDED_PROTO_HEADER).unwrap_or_else(|| "http".to_string());
        let host = header(HOST.as_str())
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Ok(RequestOrigin { scheme, host })
    }
}
