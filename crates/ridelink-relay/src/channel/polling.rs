//! Long-polling fallback transport.
//!
//! A poll session wraps one hub connection. Clients open a session, then
//! alternate `poll` (wait for events) with `send` (push client events). Sessions
//! nobody has polled for longer than the idle timeout are reaped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use ridelink_core::ServerEvent;

use super::session::ChannelSession;
use crate::hub::RoomHub;
use crate::store::TripStore;

/// Upper bound on events returned by a single poll.
pub const MAX_EVENTS_PER_POLL: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Unknown poll session: {0}")]
    UnknownSession(String),

    #[error("Poll session closed: {0}")]
    Closed(String),
}

struct PollSession {
    channel: ChannelSession,
    rx: AsyncMutex<mpsc::Receiver<ServerEvent>>,
    last_seen: Mutex<Instant>,
}

impl PollSession {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(
            *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

pub struct PollRegistry {
    sessions: RwLock<HashMap<String, Arc<PollSession>>>,
    hub: Arc<RoomHub>,
    store: Arc<dyn TripStore>,
}

impl PollRegistry {
    pub fn new(hub: Arc<RoomHub>, store: Arc<dyn TripStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            hub,
            store,
        }
    }

    fn get(&self, sid: &str) -> Result<Arc<PollSession>, PollError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sid)
            .cloned()
            .ok_or_else(|| PollError::UnknownSession(sid.to_string()))
    }

    /// Open a session and return its id.
    pub fn open(&self) -> String {
        let (conn, rx) = self.hub.connect();
        let sid = uuid::Uuid::new_v4().simple().to_string();
        let session = Arc::new(PollSession {
            channel: ChannelSession::new(conn, self.hub.clone(), self.store.clone()),
            rx: AsyncMutex::new(rx),
            last_seen: Mutex::new(Instant::now()),
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sid.clone(), session);
        debug!(sid = %sid, conn_id = conn, "Poll session opened");
        sid
    }

    /// Wait up to `window` for at least one event, then drain whatever else is
    /// queued. An empty result means the window elapsed.
    pub async fn poll(&self, sid: &str, window: Duration) -> Result<Vec<ServerEvent>, PollError> {
        let session = self.get(sid)?;
        session.touch();

        let mut rx = session.rx.lock().await;
        let mut events = Vec::new();
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => return Err(PollError::Closed(sid.to_string())),
            Err(_) => {}
        }
        while events.len() < MAX_EVENTS_PER_POLL {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        drop(rx);

        session.touch();
        Ok(events)
    }

    /// Apply one client frame on behalf of the session.
    pub async fn send(&self, sid: &str, frame: &str) -> Result<(), PollError> {
        let session = self.get(sid)?;
        session.touch();
        session.channel.handle_frame(frame).await;
        Ok(())
    }

    pub fn close(&self, sid: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sid);
        match removed {
            Some(session) => {
                self.hub.disconnect(session.channel.connection_id());
                debug!(sid, "Poll session closed");
                true
            }
            None => false,
        }
    }

    /// Close sessions idle for longer than `idle_timeout`. A session with a
    /// poll in flight is never idle.
    pub fn reap_idle(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.rx.try_lock().is_ok() && s.idle_for(now) > idle_timeout)
            .map(|(sid, _)| sid.clone())
            .collect();

        for sid in &stale {
            if let Some(session) = sessions.remove(sid) {
                self.hub.disconnect(session.channel.connection_id());
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "Reaped idle poll sessions");
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
