//! Ride offer polling and responses on the driver device.

mod debounce;
mod poller;

use chrono::Utc;
use tracing::{debug, info, warn};

use ridelink_core::RideOffer;

pub use debounce::OfferDebouncer;
pub use poller::OfferPoller;

/// Cached data the UI refetches after an offer changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedView {
    PendingOffer,
    /// The driver's current trip.
    CurrentTrip,
    AvailableRides,
}

/// Side effects of the offer poller.
pub trait OfferEvents: Send + Sync {
    /// A new pending offer arrived (alert the driver).
    fn offer_arrived(&self, offer: &RideOffer);

    fn invalidate(&self, view: CachedView);

    /// Credentials were rejected. The session must be torn down.
    fn session_expired(&self);
}

/// [`OfferEvents`] that only logs. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingOfferEvents;

impl OfferEvents for LoggingOfferEvents {
    fn offer_arrived(&self, offer: &RideOffer) {
        info!(
            offer_id = %offer.id,
            trip_id = %offer.trip_id,
            pickup = offer.trip.pickup_address.as_deref().unwrap_or("-"),
            dropoff = offer.trip.dropoff_address.as_deref().unwrap_or("-"),
            fare = offer.trip.estimated_fare.as_deref().unwrap_or("-"),
            seconds_left = offer.remaining_secs(Utc::now()),
            "New ride offer"
        );
    }

    fn invalidate(&self, view: CachedView) {
        debug!(?view, "Cached view invalidated");
    }

    fn session_expired(&self) {
        warn!("Driver session expired; signing out");
    }
}
