use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ridelink_core::{ClientEvent, LinkRejection, Room, ServerEvent};

use crate::hub::{ConnectionId, RoomHub};
use crate::store::TripStore;

/// Server-side view of one subscriber connection.
///
/// Shared by every transport; the transport only moves frames.
#[derive(Clone)]
pub struct ChannelSession {
    conn: ConnectionId,
    hub: Arc<RoomHub>,
    store: Arc<dyn TripStore>,
}

impl ChannelSession {
    pub fn new(conn: ConnectionId, hub: Arc<RoomHub>, store: Arc<dyn TripStore>) -> Self {
        Self { conn, hub, store }
    }

    pub const fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// Decode one inbound text frame and apply it. Malformed frames are
    /// logged and ignored; they never close the connection.
    pub async fn handle_frame(&self, text: &str) {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle(event).await,
            Err(e) => debug!(conn_id = self.conn, error = %e, "Ignoring invalid client frame"),
        }
    }

    pub async fn handle(&self, event: ClientEvent) {
        debug!(conn_id = self.conn, event = event.name(), key = event.key(), "Client event");
        match event {
            ClientEvent::JoinDriver(id) => self.join(Room::Driver(id)),
            ClientEvent::JoinTrip(id) => self.join(Room::Trip(id)),
            ClientEvent::LeaveDriver(id) => {
                self.hub.leave(self.conn, &Room::Driver(id));
            }
            ClientEvent::LeaveTrip(id) => {
                self.hub.leave(self.conn, &Room::Trip(id));
            }
            ClientEvent::JoinPublicToken(token) => {
                if let Err(reason) = self.join_public_token(&token).await {
                    debug!(conn_id = self.conn, %reason, "Public tracking token rejected");
                    self.hub
                        .send_to(self.conn, ServerEvent::TokenInvalid { token });
                }
            }
        }
    }

    fn join(&self, room: Room) {
        if let Err(e) = self.hub.join(self.conn, room) {
            debug!(conn_id = self.conn, error = %e, "Join on closed connection");
        }
    }

    /// Resolve the token against the store and join its rooms.
    ///
    /// Validity is checked on every attempt. A store failure is treated like a
    /// missing token so nothing is joined.
    pub async fn join_public_token(&self, token: &str) -> Result<Vec<Room>, LinkRejection> {
        let link = match self.store.resolve_public_tracking_link(token).await {
            Ok(Some(link)) => link,
            Ok(None) => return Err(LinkRejection::Missing),
            Err(e) => {
                warn!(conn_id = self.conn, error = %e, "Tracking link lookup failed");
                return Err(LinkRejection::Missing);
            }
        };
        link.check_at(Utc::now())?;

        let mut rooms = vec![
            Room::Token(link.token.clone()),
            Room::Driver(link.driver_id.clone()),
        ];
        if let Some(trip_id) = link.trip_id {
            rooms.push(Room::Trip(trip_id));
        }
        for room in &rooms {
            self.join(room.clone());
        }
        Ok(rooms)
    }
}
