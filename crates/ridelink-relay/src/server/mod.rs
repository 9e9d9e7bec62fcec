//! HTTP surface of the relay.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /ws` | Location channel over WebSocket |
//! | `POST /poll`, `GET/POST/DELETE /poll/{sid}` | Location channel over long-polling |
//! | `/api/ride-offers/*` | Driver-facing offer API |
//! | `/internal/*` | Trip store and matching collaborators |
//! | `GET /health` | Hub statistics |

mod error;
mod health;
mod identity;
mod internal;
mod offers;
mod poll;
mod ws;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use tokio::net::TcpListener;

use crate::channel::PollRegistry;
use crate::hub::RoomHub;
use crate::store::TripStore;

pub use error::ApiError;
pub use identity::{DRIVER_ID_HEADER, DriverIdentity};
pub use internal::{LocationBroadcast, TaxIdRequest, TaxIdResponse};
pub use offers::OfferAction;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
    pub store: Arc<dyn TripStore>,
    pub polls: Arc<PollRegistry>,
    /// How long `GET /poll/{sid}` waits for events.
    pub poll_window: Duration,
}

impl AppState {
    pub fn new(hub: Arc<RoomHub>, store: Arc<dyn TripStore>, poll_window: Duration) -> Self {
        let polls = Arc::new(PollRegistry::new(hub.clone(), store.clone()));
        Self {
            hub,
            store,
            polls,
            poll_window,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(ws::upgrade))
        .route("/poll", post(poll::open))
        .route(
            "/poll/{sid}",
            get(poll::poll).post(poll::send).delete(poll::close),
        )
        .route("/api/ride-offers/pending", get(offers::pending))
        .route("/api/ride-offers/accept", post(offers::accept))
        .route("/api/ride-offers/decline", post(offers::decline))
        .route("/internal/locations", post(internal::broadcast_location))
        .route("/internal/offers", post(internal::create_offer))
        .route("/internal/tracking-links", post(internal::create_tracking_link))
        .route(
            "/internal/tracking-links/{token}/revoke",
            post(internal::revoke_tracking_link),
        )
        .route("/internal/drivers/{driver_id}/tax-id", put(internal::store_tax_id))
        .with_state(state)
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_helpers {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use ridelink_crypto::FieldCipher;

    use super::*;
    use crate::store::MemoryTripStore;

    pub struct TestApp {
        pub state: AppState,
        pub store: Arc<MemoryTripStore>,
    }

    impl TestApp {
        pub fn new() -> Self {
            let store = Arc::new(MemoryTripStore::new(
                FieldCipher::from_secret("server-test").unwrap(),
            ));
            let state = AppState::new(
                Arc::new(RoomHub::default()),
                store.clone(),
                Duration::from_millis(50),
            );
            Self { state, store }
        }

        /// Send a request and return (status, JSON body or `Null`).
        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            driver: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(driver) = driver {
                builder = builder.header(DRIVER_ID_HEADER, driver);
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let resp = router(self.state.clone())
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = resp.status();
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }
}
