//! Location channel client.
//!
//! One [`ChannelClient`] owns at most one connection to the relay, created on
//! the first join and shared by every subscription. The client keeps the set
//! of rooms it has joined, sends only membership changes, and replays the set
//! whenever the connection is re-established.

mod listeners;
mod reconnect;
mod transport;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ridelink_core::{ClientEvent, DriverLocation, Room, ServerEvent};

pub use listeners::Subscription;
pub use reconnect::ReconnectPolicy;
pub use transport::{TransportKind, TransportPreference};

use listeners::Listeners;
use transport::Connection;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel client has been disconnected")]
    Closed,

    #[error("invalid room key: {0}")]
    InvalidKey(String),

    #[error("no async runtime to drive the channel connection")]
    NoRuntime,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Relay base URL, e.g. `http://127.0.0.1:8080`.
    pub relay_url: String,
    pub transport: TransportPreference,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            transport: TransportPreference::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }
}

enum Command {
    Emit(ClientEvent),
    Close,
}

enum ConnState {
    Idle,
    Running(mpsc::UnboundedSender<Command>),
    Closed,
}

struct Shared {
    memberships: Mutex<BTreeSet<Room>>,
    listeners: Arc<Listeners>,
    transport: Mutex<Option<TransportKind>>,
}

impl Shared {
    fn memberships(&self) -> MutexGuard<'_, BTreeSet<Room>> {
        self.memberships.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_transport(&self, kind: Option<TransportKind>) {
        *self.transport.lock().unwrap_or_else(PoisonError::into_inner) = kind;
    }
}

enum MembershipChange {
    Join(Room),
    Leave(Room),
}

/// Subscriber side of the location channel.
pub struct ChannelClient {
    config: Arc<ChannelConfig>,
    shared: Arc<Shared>,
    state: Mutex<ConnState>,
}

impl ChannelClient {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config: Arc::new(config),
            shared: Arc::new(Shared {
                memberships: Mutex::new(BTreeSet::new()),
                listeners: Arc::new(Listeners::default()),
                transport: Mutex::new(None),
            }),
            state: Mutex::new(ConnState::Idle),
        }
    }

    pub fn join_driver(&self, driver_id: &str) -> Result<(), ChannelError> {
        self.apply(MembershipChange::Join(Room::Driver(driver_id.to_string())))
    }

    pub fn leave_driver(&self, driver_id: &str) -> Result<(), ChannelError> {
        self.apply(MembershipChange::Leave(Room::Driver(driver_id.to_string())))
    }

    pub fn join_trip(&self, trip_id: &str) -> Result<(), ChannelError> {
        self.apply(MembershipChange::Join(Room::Trip(trip_id.to_string())))
    }

    pub fn leave_trip(&self, trip_id: &str) -> Result<(), ChannelError> {
        self.apply(MembershipChange::Leave(Room::Trip(trip_id.to_string())))
    }

    /// Join as an anonymous viewer. A rejected token is reported through
    /// [`Self::on_token_invalid`], not as an error here.
    pub fn join_public_token(&self, token: &str) -> Result<(), ChannelError> {
        self.apply(MembershipChange::Join(Room::Token(token.to_string())))
    }

    pub fn on_driver_location(&self) -> Subscription<DriverLocation> {
        self.shared.listeners.subscribe_locations()
    }

    /// Receives the token of every rejected public-token join.
    pub fn on_token_invalid(&self) -> Subscription<String> {
        self.shared.listeners.subscribe_token_invalid()
    }

    /// Close the connection and forget all memberships. The client cannot be
    /// reused afterwards.
    pub fn disconnect(&self) {
        let mut state = self.state();
        self.shared.memberships().clear();
        if let ConnState::Running(tx) = &*state {
            let _ = tx.send(Command::Close);
        }
        *state = ConnState::Closed;
        debug!("Location channel client disconnected");
    }

    /// Rooms this client is (or will be, once connected) a member of.
    pub fn memberships(&self) -> Vec<Room> {
        self.shared.memberships().iter().cloned().collect()
    }

    /// Transport of the live connection, if any.
    pub fn transport(&self) -> Option<TransportKind> {
        *self
            .shared
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, change: MembershipChange) -> Result<(), ChannelError> {
        let event = match &change {
            MembershipChange::Join(room) => join_event(room),
            MembershipChange::Leave(Room::Driver(id)) => ClientEvent::LeaveDriver(id.clone()),
            MembershipChange::Leave(Room::Trip(id)) => ClientEvent::LeaveTrip(id.clone()),
            MembershipChange::Leave(Room::Token(_)) => {
                return Err(ChannelError::Protocol("token rooms cannot be left".into()));
            }
        };
        event
            .validate()
            .map_err(|e| ChannelError::InvalidKey(e.to_string()))?;

        let mut state = self.state();
        let running = match &*state {
            ConnState::Closed => return Err(ChannelError::Closed),
            ConnState::Running(tx) if !tx.is_closed() => Some(tx.clone()),
            _ => None,
        };
        // Spawning needs a runtime; check before touching the membership set.
        let runtime = match running {
            Some(_) => None,
            None => Some(
                tokio::runtime::Handle::try_current().map_err(|_| ChannelError::NoRuntime)?,
            ),
        };

        let changed = {
            let mut memberships = self.shared.memberships();
            match change {
                MembershipChange::Join(room) => memberships.insert(room),
                MembershipChange::Leave(room) => memberships.remove(&room),
            }
        };
        if !changed {
            return Ok(());
        }

        match (running, runtime) {
            (Some(tx), _) => {
                let _ = tx.send(Command::Emit(event));
            }
            (None, Some(runtime)) => {
                // A fresh connection replays the membership set, which
                // already reflects this change.
                let (tx, rx) = mpsc::unbounded_channel();
                runtime.spawn(run_connection(
                    Arc::clone(&self.config),
                    Arc::clone(&self.shared),
                    rx,
                ));
                *state = ConnState::Running(tx);
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        if let ConnState::Running(tx) = &*self.state() {
            let _ = tx.send(Command::Close);
        }
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("relay_url", &self.config.relay_url)
            .field("memberships", &self.memberships())
            .field("transport", &self.transport())
            .finish_non_exhaustive()
    }
}

fn join_event(room: &Room) -> ClientEvent {
    match room {
        Room::Driver(id) => ClientEvent::JoinDriver(id.clone()),
        Room::Trip(id) => ClientEvent::JoinTrip(id.clone()),
        Room::Token(token) => ClientEvent::JoinPublicToken(token.clone()),
    }
}

enum Exit {
    /// The client asked to close or was dropped.
    Closed,
    Lost(String),
}

/// Connection actor: connect, replay memberships, pump events, reconnect.
async fn run_connection(
    config: Arc<ChannelConfig>,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let policy = &config.reconnect;
    let mut attempt: u32 = 0;

    loop {
        let started = Instant::now();
        let opened = tokio::select! {
            result = Connection::open(&config.relay_url, config.transport, config.connect_timeout) => result,
            () = wait_for_close(&mut commands) => return,
        };

        match opened {
            Ok(mut conn) => {
                let kind = conn.kind();
                shared.set_transport(Some(kind));
                info!(transport = ?kind, url = %config.relay_url, "Location channel connected");

                let exit = match replay(&mut conn, &shared).await {
                    Ok(()) => pump(&mut conn, &shared, &mut commands).await,
                    Err(e) => Exit::Lost(e.to_string()),
                };
                shared.set_transport(None);
                conn.close().await;

                match exit {
                    Exit::Closed => {
                        debug!("Location channel closed");
                        return;
                    }
                    Exit::Lost(reason) => {
                        warn!(%reason, "Location channel lost");
                    }
                }
                if started.elapsed() >= policy.stable_after {
                    attempt = 0;
                }
            }
            Err(e) => {
                warn!(error = %e, attempt, "Location channel connect failed");
            }
        }

        if !policy.should_retry(attempt) {
            warn!(attempt, "Giving up on location channel");
            return;
        }
        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        info!(?delay, attempt, "Reconnecting location channel");

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = wait_for_close(&mut commands) => return,
        }
    }
}

/// Resolves once the client closes. Emits seen meanwhile are dropped; the
/// next connection replays the membership set instead.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Close) {
            return;
        }
    }
}

async fn replay(conn: &mut Connection, shared: &Shared) -> Result<(), ChannelError> {
    let rooms: Vec<Room> = shared.memberships().iter().cloned().collect();
    for room in &rooms {
        conn.send(&join_event(room)).await?;
    }
    if !rooms.is_empty() {
        debug!(rooms = rooms.len(), "Replayed memberships");
    }
    Ok(())
}

async fn pump(
    conn: &mut Connection,
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Exit {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(Command::Close) => return Exit::Closed,
                Some(Command::Emit(event)) => {
                    if let Err(e) = conn.send(&event).await {
                        return Exit::Lost(e.to_string());
                    }
                }
            },
            received = conn.recv() => match received {
                Ok(Some(ServerEvent::DriverLocation(location))) => {
                    shared.listeners.dispatch_location(&location);
                }
                Ok(Some(ServerEvent::TokenInvalid { token })) => {
                    shared.memberships().remove(&Room::Token(token.clone()));
                    info!("Public tracking token rejected by relay");
                    shared.listeners.dispatch_token_invalid(&token);
                }
                Ok(None) => return Exit::Lost("closed by relay".into()),
                Err(e) => return Exit::Lost(e.to_string()),
            },
        }
    }
}
