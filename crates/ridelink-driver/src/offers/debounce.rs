use ridelink_core::RideOffer;

/// Edge-triggered offer notification.
///
/// Fires once per distinct offer id. Seeing no offer resets the state, so an
/// offer that disappears and comes back notifies again.
#[derive(Debug, Default, Clone)]
pub struct OfferDebouncer {
    last_known_offer_id: Option<String>,
}

impl OfferDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetch result. Returns `true` when the driver should be alerted.
    pub fn observe(&mut self, offer: Option<&RideOffer>) -> bool {
        match offer {
            Some(offer) if self.last_known_offer_id.as_deref() != Some(offer.id.as_str()) => {
                self.last_known_offer_id = Some(offer.id.clone());
                true
            }
            Some(_) => false,
            None => {
                self.last_known_offer_id = None;
                false
            }
        }
    }

    pub fn last_known_offer_id(&self) -> Option<&str> {
        self.last_known_offer_id.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use ridelink_core::{OfferStatus, TripSummary};

    use super::*;

    fn offer(id: &str) -> RideOffer {
        let now = Utc::now();
        RideOffer {
            id: id.into(),
            trip_id: "t1".into(),
            driver_id: "d1".into(),
            status: OfferStatus::Pending,
            offered_at: now,
            expires_at: now + Duration::seconds(30),
            responded_at: None,
            trip: TripSummary::default(),
        }
    }

    #[test]
    fn notifies_once_per_offer_sequence() {
        // o1, o1, null, o2, o2 -> notify on o1 and o2 only
        let o1 = offer("o1");
        let o2 = offer("o2");
        let mut debouncer = OfferDebouncer::new();
        let fired: Vec<bool> = [Some(&o1), Some(&o1), None, Some(&o2), Some(&o2)]
            .into_iter()
            .map(|fetch| debouncer.observe(fetch))
            .collect();
        assert_eq!(fired, vec![true, false, false, true, false]);
        assert_eq!(debouncer.last_known_offer_id(), Some("o2"));
    }

    #[test]
    fn same_offer_after_gap_notifies_again() {
        let o1 = offer("o1");
        let mut debouncer = OfferDebouncer::new();
        assert!(debouncer.observe(Some(&o1)));
        assert!(!debouncer.observe(None));
        assert!(debouncer.last_known_offer_id().is_none());
        assert!(debouncer.observe(Some(&o1)));
    }

    #[test]
    fn replacement_offer_notifies_without_gap() {
        let mut debouncer = OfferDebouncer::new();
        assert!(debouncer.observe(Some(&offer("o1"))));
        assert!(debouncer.observe(Some(&offer("o2"))));
    }
}
