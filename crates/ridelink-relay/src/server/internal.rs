//! Endpoints for the trip store and matching collaborators.
//!
//! These sit behind the deployment's internal network boundary and carry no
//! driver identity.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ridelink_core::{LocationUpdate, PublicTrackingLink, RideOffer};

use super::{ApiError, AppState};
use crate::hub::BroadcastReport;
use crate::store::{NewOffer, NewTrackingLink};

/// Body of `POST /internal/locations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBroadcast {
    pub driver_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(flatten)]
    pub update: LocationUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxIdRequest {
    pub tax_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxIdResponse {
    pub driver_id: String,
    pub tax_id_last4: Option<String>,
}

pub async fn broadcast_location(
    State(state): State<AppState>,
    Json(body): Json<LocationBroadcast>,
) -> Result<Json<BroadcastReport>, ApiError> {
    if body.driver_id.trim().is_empty() {
        return Err(ApiError::BadRequest("driverId must not be empty".into()));
    }
    let report =
        state
            .hub
            .broadcast_location(&body.driver_id, body.update, body.trip_id.as_deref())?;
    debug!(
        driver_id = %body.driver_id,
        delivered = report.delivered,
        dropped = report.dropped,
        "Location broadcast"
    );
    Ok(Json(report))
}

pub async fn create_offer(
    State(state): State<AppState>,
    Json(params): Json<NewOffer>,
) -> Result<(StatusCode, Json<RideOffer>), ApiError> {
    let offer = state.store.create_offer(params, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

pub async fn create_tracking_link(
    State(state): State<AppState>,
    Json(params): Json<NewTrackingLink>,
) -> Result<(StatusCode, Json<PublicTrackingLink>), ApiError> {
    let link = state.store.create_tracking_link(params, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn revoke_tracking_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicTrackingLink>, ApiError> {
    let link = state.store.revoke_tracking_link(&token, Utc::now()).await?;
    Ok(Json(link))
}

/// Store the tax id encrypted and echo back only its last four characters.
pub async fn store_tax_id(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Json(body): Json<TaxIdRequest>,
) -> Result<Json<TaxIdResponse>, ApiError> {
    state.store.store_driver_tax_id(&driver_id, &body.tax_id).await?;
    let tax_id_last4 = state.store.driver_tax_id_masked(&driver_id).await?;
    Ok(Json(TaxIdResponse {
        driver_id,
        tax_id_last4,
    }))
}
