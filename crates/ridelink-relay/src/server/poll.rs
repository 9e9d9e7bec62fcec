//! Long-poll transport endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use ridelink_core::ServerEvent;

use super::{ApiError, AppState};
use crate::channel::PollError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOpened {
    pub sid: String,
}

/// `POST /poll`
pub async fn open(State(state): State<AppState>) -> (StatusCode, Json<PollOpened>) {
    let sid = state.polls.open();
    (StatusCode::CREATED, Json(PollOpened { sid }))
}

/// `GET /poll/{sid}`: events queued within the poll window, possibly none.
pub async fn poll(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Vec<ServerEvent>>, ApiError> {
    let events = state.polls.poll(&sid, state.poll_window).await?;
    Ok(Json(events))
}

/// `POST /poll/{sid}` with one client event frame as the body.
pub async fn send(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    frame: String,
) -> Result<StatusCode, ApiError> {
    state.polls.send(&sid, &frame).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /poll/{sid}`
pub async fn close(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.polls.close(&sid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(PollError::UnknownSession(sid).into())
    }
}
