use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;

/// Header carrying the authenticated driver id, set by the upstream auth layer.
pub const DRIVER_ID_HEADER: &str = "x-driver-id";

/// The calling driver, taken from [`DRIVER_ID_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity(pub String);

impl<S: Send + Sync> FromRequestParts<S> for DriverIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(DRIVER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}
