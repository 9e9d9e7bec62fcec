//! Channel transports: WebSocket first, HTTP long-polling as fallback.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use ridelink_core::{ClientEvent, ServerEvent};

use super::ChannelError;

/// Upper bound on one long-poll request; the relay answers well before this.
const LONG_POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Events fetched by the long-poll task but not yet consumed.
const LONG_POLL_BUFFER: usize = 256;

/// Which transport the client may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// WebSocket, falling back to long-polling when it cannot be established.
    #[default]
    Auto,
    WebSocket,
    LongPoll,
}

/// The transport actually in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    LongPoll,
}

pub(crate) enum Connection {
    WebSocket(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
    LongPoll(PollConnection),
}

impl Connection {
    pub(crate) async fn open(
        relay_url: &str,
        preference: TransportPreference,
        connect_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        match preference {
            TransportPreference::WebSocket => open_websocket(relay_url, connect_timeout).await,
            TransportPreference::LongPoll => {
                PollConnection::open(relay_url, connect_timeout).await.map(Self::LongPoll)
            }
            TransportPreference::Auto => match open_websocket(relay_url, connect_timeout).await {
                Ok(conn) => Ok(conn),
                Err(e) => {
                    info!(error = %e, "WebSocket unavailable, falling back to long-polling");
                    PollConnection::open(relay_url, connect_timeout)
                        .await
                        .map(Self::LongPoll)
                }
            },
        }
    }

    pub(crate) const fn kind(&self) -> TransportKind {
        match self {
            Self::WebSocket(_) => TransportKind::WebSocket,
            Self::LongPoll(_) => TransportKind::LongPoll,
        }
    }

    pub(crate) async fn send(&mut self, event: &ClientEvent) -> Result<(), ChannelError> {
        let frame = event
            .to_json()
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        match self {
            Self::WebSocket(ws) => Ok(ws.send(Message::Text(frame)).await?),
            Self::LongPoll(poll) => poll.send(frame).await,
        }
    }

    /// Next event from the relay; `Ok(None)` when the relay closed the
    /// connection. Cancel-safe.
    pub(crate) async fn recv(&mut self) -> Result<Option<ServerEvent>, ChannelError> {
        match self {
            Self::WebSocket(ws) => loop {
                let Some(message) = ws.next().await else {
                    return Ok(None);
                };
                match message? {
                    Message::Text(text) => match ServerEvent::from_json(&text) {
                        Ok(event) => return Ok(Some(event)),
                        Err(e) => debug!(error = %e, "Ignoring undecodable frame"),
                    },
                    Message::Close(_) => return Ok(None),
                    _ => {}
                }
            },
            Self::LongPoll(poll) => poll.recv().await,
        }
    }

    pub(crate) async fn close(self) {
        match self {
            Self::WebSocket(mut ws) => {
                if let Err(e) = (*ws).close(None).await {
                    debug!(error = %e, "WebSocket close failed");
                }
            }
            Self::LongPoll(poll) => poll.close().await,
        }
    }
}

/// `http://host` -> `ws://host/ws`, `https://host` -> `wss://host/ws`.
pub(crate) fn websocket_url(relay_url: &str) -> Result<String, ChannelError> {
    let base = relay_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ChannelError::Connect(format!(
            "unsupported relay url: {relay_url}"
        )));
    };
    Ok(format!("{rest}/ws"))
}

async fn open_websocket(
    relay_url: &str,
    connect_timeout: Duration,
) -> Result<Connection, ChannelError> {
    let url = websocket_url(relay_url)?;
    let (ws, _response) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| ChannelError::Connect(format!("timed out connecting to {url}")))??;
    debug!(%url, "WebSocket connected");
    Ok(Connection::WebSocket(Box::new(ws)))
}

#[derive(Deserialize)]
struct PollOpened {
    sid: String,
}

/// A long-poll session. A background task keeps one `GET /poll/{sid}` in
/// flight and forwards what it returns.
pub(crate) struct PollConnection {
    http: reqwest::Client,
    session_url: String,
    events: mpsc::Receiver<Result<ServerEvent, ChannelError>>,
    task: JoinHandle<()>,
}

impl PollConnection {
    async fn open(relay_url: &str, connect_timeout: Duration) -> Result<Self, ChannelError> {
        // reqwest is built with rustls-no-provider; an Err here means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(LONG_POLL_REQUEST_TIMEOUT)
            .build()?;
        let base = relay_url.trim_end_matches('/');

        let opened: PollOpened = http
            .post(format!("{base}/poll"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let session_url = format!("{base}/poll/{}", opened.sid);
        debug!(sid = %opened.sid, "Long-poll session opened");

        let (tx, events) = mpsc::channel(LONG_POLL_BUFFER);
        let task = tokio::spawn(poll_loop(http.clone(), session_url.clone(), tx));

        Ok(Self {
            http,
            session_url,
            events,
            task,
        })
    }

    async fn send(&self, frame: String) -> Result<(), ChannelError> {
        self.http
            .post(&self.session_url)
            .body(frame)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ServerEvent>, ChannelError> {
        self.events.recv().await.transpose()
    }

    async fn close(self) {
        self.task.abort();
        if let Err(e) = self.http.delete(&self.session_url).send().await {
            debug!(error = %e, "Long-poll session close failed");
        }
    }
}

impl Drop for PollConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    http: reqwest::Client,
    session_url: String,
    tx: mpsc::Sender<Result<ServerEvent, ChannelError>>,
) {
    loop {
        let batch = match fetch_batch(&http, &session_url).await {
            Ok(batch) => batch,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for value in batch {
            match serde_json::from_value::<ServerEvent>(value) {
                Ok(event) => {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring undecodable long-poll event"),
            }
        }
    }
}

async fn fetch_batch(
    http: &reqwest::Client,
    session_url: &str,
) -> Result<Vec<serde_json::Value>, ChannelError> {
    let resp = http.get(session_url).send().await?;
    if !resp.status().is_success() {
        warn!(status = %resp.status(), "Long-poll session ended by relay");
        return Err(ChannelError::Http(format!(
            "long-poll returned {}",
            resp.status()
        )));
    }
    Ok(resp.json().await?)
}
