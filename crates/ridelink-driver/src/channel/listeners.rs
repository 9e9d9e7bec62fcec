//! Typed listener registry with owned subscription handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

use ridelink_core::DriverLocation;

/// Per-listener buffer; a listener that falls this far behind misses events.
const LISTENER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    DriverLocation,
    TokenInvalid,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    locations: HashMap<u64, mpsc::Sender<DriverLocation>>,
    token_invalid: HashMap<u64, mpsc::Sender<String>>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    table: Mutex<ListenerTable>,
}

impl Listeners {
    fn table(&self) -> std::sync::MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe_locations(self: &Arc<Self>) -> Subscription<DriverLocation> {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let mut table = self.table();
        let id = table.next_id;
        table.next_id += 1;
        table.locations.insert(id, tx);
        Subscription::new(id, ListenerKind::DriverLocation, rx, self)
    }

    pub(crate) fn subscribe_token_invalid(self: &Arc<Self>) -> Subscription<String> {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let mut table = self.table();
        let id = table.next_id;
        table.next_id += 1;
        table.token_invalid.insert(id, tx);
        Subscription::new(id, ListenerKind::TokenInvalid, rx, self)
    }

    pub(crate) fn dispatch_location(&self, location: &DriverLocation) {
        self.table()
            .locations
            .retain(|_, tx| !matches!(tx.try_send(location.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    pub(crate) fn dispatch_token_invalid(&self, token: &str) {
        self.table()
            .token_invalid
            .retain(|_, tx| !matches!(tx.try_send(token.to_string()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    fn remove(&self, kind: ListenerKind, id: u64) {
        let mut table = self.table();
        match kind {
            ListenerKind::DriverLocation => {
                table.locations.remove(&id);
            }
            ListenerKind::TokenInvalid => {
                table.token_invalid.remove(&id);
            }
        }
    }

    pub(crate) fn location_listener_count(&self) -> usize {
        self.table().locations.len()
    }
}

/// An active listener. Dropping it unsubscribes this listener only.
pub struct Subscription<T> {
    id: u64,
    kind: ListenerKind,
    rx: mpsc::Receiver<T>,
    registry: Weak<Listeners>,
}

impl<T> Subscription<T> {
    fn new(id: u64, kind: ListenerKind, rx: mpsc::Receiver<T>, registry: &Arc<Listeners>) -> Self {
        Self {
            id,
            kind,
            rx,
            registry: Arc::downgrade(registry),
        }
    }

    /// Wait for the next event. `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use ridelink_core::LocationUpdate;

    use super::*;

    fn location() -> DriverLocation {
        DriverLocation {
            driver_id: "d1".into(),
            update: LocationUpdate::new(1.0, 2.0, Utc::now()),
        }
    }

    #[test]
    fn every_listener_receives_each_event() {
        let listeners = Arc::new(Listeners::default());
        let mut a = listeners.subscribe_locations();
        let mut b = listeners.subscribe_locations();

        listeners.dispatch_location(&location());
        assert_eq!(a.try_recv().unwrap().driver_id, "d1");
        assert_eq!(b.try_recv().unwrap().driver_id, "d1");
    }

    #[test]
    fn dropping_one_subscription_leaves_others() {
        let listeners = Arc::new(Listeners::default());
        let a = listeners.subscribe_locations();
        let mut b = listeners.subscribe_locations();
        assert_eq!(listeners.location_listener_count(), 2);

        drop(a);
        assert_eq!(listeners.location_listener_count(), 1);
        listeners.dispatch_location(&location());
        assert!(b.try_recv().is_some());
    }

    #[test]
    fn token_invalid_listeners_are_separate() {
        let listeners = Arc::new(Listeners::default());
        let mut locations = listeners.subscribe_locations();
        let mut invalid = listeners.subscribe_token_invalid();

        listeners.dispatch_token_invalid("tok");
        assert_eq!(invalid.try_recv().as_deref(), Some("tok"));
        assert!(locations.try_recv().is_none());
    }

    #[test]
    fn slow_listener_drops_overflow() {
        let listeners = Arc::new(Listeners::default());
        let mut slow = listeners.subscribe_locations();
        for _ in 0..LISTENER_BUFFER + 10 {
            listeners.dispatch_location(&location());
        }
        let mut received = 0;
        while slow.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, LISTENER_BUFFER);
        assert_eq!(listeners.location_listener_count(), 1);
    }
}
