//! Driver-facing ride offer endpoints.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use ridelink_core::{OfferDecision, RideOffer, TripAssignment};

use super::{ApiError, AppState, DriverIdentity};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferAction {
    pub offer_id: String,
}

/// `GET /api/ride-offers/pending`; the body is `null` when there is no offer.
pub async fn pending(
    State(state): State<AppState>,
    DriverIdentity(driver_id): DriverIdentity,
) -> Result<Json<Option<RideOffer>>, ApiError> {
    let offer = state
        .store
        .pending_offer_for_driver(&driver_id, Utc::now())
        .await?;
    Ok(Json(offer))
}

/// `POST /api/ride-offers/accept`
pub async fn accept(
    State(state): State<AppState>,
    DriverIdentity(driver_id): DriverIdentity,
    Json(action): Json<OfferAction>,
) -> Result<Json<TripAssignment>, ApiError> {
    let offer = respond(&state, &driver_id, action, OfferDecision::Accept).await?;
    Ok(Json(TripAssignment {
        trip_id: offer.trip_id.clone(),
        offer,
    }))
}

/// `POST /api/ride-offers/decline`
pub async fn decline(
    State(state): State<AppState>,
    DriverIdentity(driver_id): DriverIdentity,
    Json(action): Json<OfferAction>,
) -> Result<Json<Value>, ApiError> {
    respond(&state, &driver_id, action, OfferDecision::Decline).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn respond(
    state: &AppState,
    driver_id: &str,
    action: OfferAction,
    decision: OfferDecision,
) -> Result<RideOffer, ApiError> {
    if action.offer_id.trim().is_empty() {
        return Err(ApiError::BadRequest("offerId must not be empty".into()));
    }
    Ok(state
        .store
        .respond_to_offer(driver_id, &action.offer_id, decision, Utc::now())
        .await?)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::Duration;

    use ridelink_core::{OfferStatus, TripSummary};

    use crate::server::test_helpers::TestApp;
    use crate::store::{NewOffer, TripStore};

    use super::*;

    async fn offer(app: &TestApp, trip: &str, driver: &str) -> RideOffer {
        app.store
            .create_offer(
                NewOffer {
                    trip_id: trip.into(),
                    driver_id: driver.into(),
                    ttl_secs: 30,
                    trip: TripSummary {
                        pickup_address: Some("12 Marina Rd".into()),
                        ..TripSummary::default()
                    },
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pending_requires_driver_header() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::GET, "/api/ride-offers/pending", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn pending_returns_null_then_offer() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::GET, "/api/ride-offers/pending", Some("d1"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());

        let created = offer(&app, "t1", "d1").await;
        let (status, body) = app
            .send(Method::GET, "/api/ride-offers/pending", Some("d1"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], created.id);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["trip"]["pickupAddress"], "12 Marina Rd");
    }

    #[tokio::test]
    async fn accept_returns_trip_assignment_and_expires_rivals() {
        let app = TestApp::new();
        let mine = offer(&app, "t1", "d1").await;
        let rival = offer(&app, "t1", "d2").await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/ride-offers/accept",
                Some("d1"),
                Some(json!({ "offerId": mine.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tripId"], "t1");
        assert_eq!(body["offer"]["status"], "accepted");

        let rival = app.store.offer(&rival.id).await.unwrap();
        assert_eq!(rival.status, OfferStatus::Expired);
    }

    #[tokio::test]
    async fn decline_returns_ok() {
        let app = TestApp::new();
        let mine = offer(&app, "t1", "d1").await;
        let (status, body) = app
            .send(
                Method::POST,
                "/api/ride-offers/decline",
                Some("d1"),
                Some(json!({ "offerId": mine.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(
            app.store.offer(&mine.id).await.unwrap().status,
            OfferStatus::Declined
        );
    }

    #[tokio::test]
    async fn respond_error_statuses() {
        let app = TestApp::new();
        let mine = offer(&app, "t1", "d1").await;

        let (status, _) = app
            .send(
                Method::POST,
                "/api/ride-offers/accept",
                Some("d2"),
                Some(json!({ "offerId": mine.id })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(
                Method::POST,
                "/api/ride-offers/accept",
                Some("d1"),
                Some(json!({ "offerId": "missing" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .send(
                Method::POST,
                "/api/ride-offers/decline",
                Some("d1"),
                Some(json!({ "offerId": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.send(
            Method::POST,
            "/api/ride-offers/decline",
            Some("d1"),
            Some(json!({ "offerId": mine.id })),
        )
        .await;
        let (status, _) = app
            .send(
                Method::POST,
                "/api/ride-offers/accept",
                Some("d1"),
                Some(json!({ "offerId": mine.id })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn accepting_expired_offer_conflicts() {
        let app = TestApp::new();
        let stale = app
            .store
            .create_offer(
                NewOffer {
                    trip_id: "t1".into(),
                    driver_id: "d1".into(),
                    ttl_secs: 30,
                    trip: TripSummary::default(),
                },
                Utc::now() - Duration::seconds(60),
            )
            .await
            .unwrap();

        let (status, _) = app
            .send(
                Method::POST,
                "/api/ride-offers/accept",
                Some("d1"),
                Some(json!({ "offerId": stale.id })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            app.store.offer(&stale.id).await.unwrap().status,
            OfferStatus::Expired
        );
    }
}
