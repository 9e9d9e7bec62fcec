//! In-memory room hub for live location fan-out.
//!
//! Each subscriber connection owns a bounded outbound queue. Rooms map to sets
//! of connection ids, so joining twice never produces a second registration.
//! Broadcasting never awaits: events are pushed with `try_send` and dropped
//! for subscribers whose queue is full (at-most-once delivery).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ridelink_core::{DriverLocation, LocationUpdate, Room, ServerEvent};

/// Identifier of one subscriber connection (WebSocket or long-poll session).
pub type ConnectionId = u64;

/// Default per-connection outbound queue size.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

/// Outcome of one `broadcast_location` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Recipients whose queue was full or already closed.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
}

struct ConnectionEntry {
    tx: mpsc::Sender<ServerEvent>,
    rooms: BTreeSet<Room>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<Room, BTreeSet<ConnectionId>>,
}

/// Thread-safe registry of subscriber connections and their rooms.
pub struct RoomHub {
    state: RwLock<HubState>,
    next_id: AtomicU64,
    outbound_capacity: usize,
}

impl RoomHub {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            next_id: AtomicU64::new(1),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection and return its id and event receiver.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        self.write().connections.insert(
            id,
            ConnectionEntry {
                tx,
                rooms: BTreeSet::new(),
            },
        );
        debug!(conn_id = id, "Channel connection registered");
        (id, rx)
    }

    /// Drop a connection and all of its memberships.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut state = self.write();
        let Some(entry) = state.connections.remove(&id) else {
            return false;
        };
        for room in &entry.rooms {
            remove_member(&mut state.rooms, room, id);
        }
        debug!(conn_id = id, rooms = entry.rooms.len(), "Channel connection removed");
        true
    }

    /// Add a connection to a room. Returns `false` if it was already a member.
    pub fn join(&self, id: ConnectionId, room: Room) -> Result<bool, HubError> {
        let mut state = self.write();
        let entry = state
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;
        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }
        debug!(conn_id = id, room = %room, "Joined room");
        state.rooms.entry(room).or_default().insert(id);
        Ok(true)
    }

    /// Remove a connection from a room. Returns `false` if it was not a member.
    pub fn leave(&self, id: ConnectionId, room: &Room) -> bool {
        let mut state = self.write();
        let removed = state
            .connections
            .get_mut(&id)
            .is_some_and(|entry| entry.rooms.remove(room));
        if removed {
            remove_member(&mut state.rooms, room, id);
            debug!(conn_id = id, room = %room, "Left room");
        }
        removed
    }

    /// Push an event to a single connection.
    pub fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        self.read()
            .connections
            .get(&id)
            .is_some_and(|entry| entry.tx.try_send(event).is_ok())
    }

    /// Emit a location sample to `driver:<driver_id>` and, when given,
    /// `trip:<trip_id>`. A connection in both rooms receives it once.
    pub fn broadcast_location(
        &self,
        driver_id: &str,
        update: LocationUpdate,
        trip_id: Option<&str>,
    ) -> Result<BroadcastReport, HubError> {
        update
            .validate()
            .map_err(|e| HubError::InvalidLocation(e.to_string()))?;

        let event = ServerEvent::DriverLocation(DriverLocation {
            driver_id: driver_id.to_string(),
            update,
        });

        let mut targets = vec![Room::Driver(driver_id.to_string())];
        if let Some(trip_id) = trip_id {
            targets.push(Room::Trip(trip_id.to_string()));
        }

        let state = self.read();
        let recipients: BTreeSet<ConnectionId> = targets
            .iter()
            .filter_map(|room| state.rooms.get(room))
            .flatten()
            .copied()
            .collect();

        let mut report = BroadcastReport::default();
        for id in recipients {
            let sent = state
                .connections
                .get(&id)
                .is_some_and(|entry| entry.tx.try_send(event.clone()).is_ok());
            if sent {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                debug!(conn_id = id, driver_id, "Dropped location event for slow subscriber");
            }
        }
        Ok(report)
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.read().rooms.get(room).map_or(0, BTreeSet::len)
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<Room> {
        self.read()
            .connections
            .get(&id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.read().connections.contains_key(&id)
    }

    pub fn stats(&self) -> HubStats {
        let state = self.read();
        HubStats {
            connections: state.connections.len(),
            rooms: state.rooms.len(),
        }
    }

    /// Log a one-line summary; used on shutdown.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            connections = stats.connections,
            rooms = stats.rooms,
            "Location hub state"
        );
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

fn remove_member(
    rooms: &mut HashMap<Room, BTreeSet<ConnectionId>>,
    room: &Room,
    id: ConnectionId,
) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(&id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}
