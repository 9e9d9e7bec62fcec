use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.hub.stats();
    Json(json!({
        "status": "ok",
        "connections": stats.connections,
        "rooms": stats.rooms,
        "pollSessions": state.polls.len(),
    }))
}
