use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use ridelink_core::{FailureCategory, RideOffer, TripAssignment};

use super::{CachedView, OfferDebouncer, OfferEvents};
use crate::api::OfferApi;
use crate::retry::{RequestError, RetryPolicy, execute};

#[derive(Default)]
struct PollerState {
    debouncer: OfferDebouncer,
    current: Option<RideOffer>,
}

/// Polls for the driver's pending offer and relays accept/decline.
///
/// The poller never expires an offer locally; it only hides offers past
/// their deadline from [`OfferPoller::actionable_offer`].
pub struct OfferPoller {
    api: Arc<dyn OfferApi>,
    events: Arc<dyn OfferEvents>,
    policy: RetryPolicy,
    interval: Duration,
    live: AtomicBool,
    stop: Notify,
    state: Mutex<PollerState>,
}

impl OfferPoller {
    pub fn new(
        api: Arc<dyn OfferApi>,
        events: Arc<dyn OfferEvents>,
        policy: RetryPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            events,
            policy,
            interval,
            live: AtomicBool::new(true),
            stop: Notify::new(),
            state: Mutex::new(PollerState::default()),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop polling. Results that land afterwards are discarded.
    pub fn shutdown(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Offer poller torn down");
        }
        self.stop.notify_waiters();
    }

    /// Fetch the pending offer once and update local state.
    pub async fn tick(&self) -> Result<Option<RideOffer>, RequestError> {
        let result = execute(&self.policy, || self.api.pending_offer()).await;
        if !self.is_live() {
            return Ok(None);
        }

        let offer = match result {
            Ok(offer) => offer,
            Err(e) => {
                self.on_failure(&e);
                return Err(e);
            }
        };

        let notify = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.is_live() {
                return Ok(None);
            }
            let notify = state.debouncer.observe(offer.as_ref());
            state.current.clone_from(&offer);
            notify
        };
        if let Some(offer) = offer.as_ref().filter(|_| notify) {
            self.events.offer_arrived(offer);
        }
        Ok(offer)
    }

    /// Poll on the configured interval until shut down. The first fetch
    /// happens immediately. A fetch still in flight at teardown is dropped
    /// before its result can touch any state.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis(), "Offer polling started");

        while self.is_live() {
            tokio::select! {
                biased;
                () = self.stop.notified() => break,
                _ = shutdown.changed() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                biased;
                () = self.stop.notified() => break,
                _ = shutdown.changed() => break,
                result = self.tick() => {
                    if let Err(e) = result {
                        debug!(error = %e, "Offer poll failed");
                    }
                }
            }
        }

        self.shutdown();
        info!("Offer polling stopped");
    }

    /// Accept an offer. Sent once; a non-idempotent call is never retried.
    pub async fn accept(&self, offer_id: &str) -> Result<TripAssignment, RequestError> {
        let policy = self.single_shot();
        let result = execute(&policy, || self.api.accept_offer(offer_id)).await;
        match result {
            Ok(assignment) => {
                info!(offer_id, trip_id = %assignment.trip_id, "Ride offer accepted");
                if self.is_live() {
                    self.events.invalidate(CachedView::PendingOffer);
                    self.events.invalidate(CachedView::CurrentTrip);
                    self.events.invalidate(CachedView::AvailableRides);
                }
                Ok(assignment)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    pub async fn decline(&self, offer_id: &str) -> Result<(), RequestError> {
        let policy = self.single_shot();
        match execute(&policy, || self.api.decline_offer(offer_id)).await {
            Ok(()) => {
                info!(offer_id, "Ride offer declined");
                if self.is_live() {
                    self.events.invalidate(CachedView::PendingOffer);
                }
                Ok(())
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    /// The last fetched offer, if the driver can still act on it at `now`.
    pub fn actionable_offer(&self, now: DateTime<Utc>) -> Option<RideOffer> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
            .filter(|offer| offer.is_actionable_at(now))
    }

    pub fn last_known_offer_id(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .debouncer
            .last_known_offer_id()
            .map(str::to_string)
    }

    fn single_shot(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::no_retry();
        policy.timeout = self.policy.timeout;
        policy
    }

    fn on_failure(&self, error: &RequestError) {
        if error.category() == FailureCategory::Unauthorized && self.is_live() {
            warn!(error = %error, "Offer request unauthorized; ending session");
            self.shutdown();
            self.events.session_expired();
        }
    }
}
