//! WebSocket transport for the location channel.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::AppState;
use crate::channel::ChannelSession;

/// `GET /ws`
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (conn, mut outbound) = state.hub.connect();
    let session = ChannelSession::new(conn, state.hub.clone(), state.store.clone());
    let (mut sink, mut stream) = socket.split();
    info!(conn_id = conn, "WebSocket subscriber connected");

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => session.handle_frame(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = conn, error = %e, "WebSocket read failed");
                    break;
                }
            },
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(conn_id = conn, event = event.name(), error = %e, "Failed to encode server event");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.disconnect(conn);
    info!(conn_id = conn, "WebSocket subscriber disconnected");
}
