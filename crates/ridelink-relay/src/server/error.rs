//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};

use crate::channel::PollError;
use crate::hub::HubError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing driver identity")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Hub(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::WrongDriver { .. } => StatusCode::FORBIDDEN,
                StoreError::NotPending { .. }
                | StoreError::Expired { .. }
                | StoreError::DriverBusy { .. } => StatusCode::CONFLICT,
                StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                StoreError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Poll(e) => match e {
                PollError::UnknownSession(_) => StatusCode::NOT_FOUND,
                PollError::Closed(_) => StatusCode::GONE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Crypto failures can echo envelope details; keep them out of the body.
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use ridelink_core::OfferStatus;
    use ridelink_crypto::CryptoError;

    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let cases = [
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                StoreError::WrongDriver {
                    offer_id: "o".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                StoreError::NotPending {
                    offer_id: "o".into(),
                    status: OfferStatus::Accepted,
                },
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Expired {
                    offer_id: "o".into(),
                },
                StatusCode::CONFLICT,
            ),
            (StoreError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                StoreError::Crypto(CryptoError::AuthenticationFailed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                StoreError::Unavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }
}
