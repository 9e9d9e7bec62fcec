//! Domain model shared by the relay and driver crates.
//!
//! Field names on the wire are camelCase to stay compatible with the web and
//! mobile clients that already consume these payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a ride offer.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Expired,
    Declined,
}

impl OfferStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized trip details shown on the offer card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_address: Option<String>,
    /// Decimal string as produced by the fare service (e.g. `"12.50"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_fare: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_count: Option<u32>,
}

/// A candidate match between a trip request and a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    pub id: String,
    #[serde(alias = "rideId")]
    pub trip_id: String,
    pub driver_id: String,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "ride")]
    pub trip: TripSummary,
}

impl RideOffer {
    /// Whether the driver can still act on this offer.
    ///
    /// Only used to hide stale UI; expiry itself is decided by the trip store.
    pub fn is_actionable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && now < self.expires_at
    }

    /// Whole seconds left before the offer expires, rounded up, never negative.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.expires_at - now).num_milliseconds();
        u64::try_from(millis).map_or(0, |m| m.div_ceil(1000))
    }
}

/// The "updated trip context" returned when a driver accepts an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripAssignment {
    pub trip_id: String,
    pub offer: RideOffer,
}

/// A driver's answer to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferDecision {
    Accept,
    Decline,
}

impl OfferDecision {
    pub const fn resulting_status(self) -> OfferStatus {
        match self {
            Self::Accept => OfferStatus::Accepted,
            Self::Decline => OfferStatus::Declined,
        }
    }
}

/// A single positional sample from a driver's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    /// Horizontal accuracy in metres.
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Device battery level, 0-100.
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub is_moving: Option<bool>,
    /// Capture time on the device, not receipt time.
    pub updated_at: DateTime<Utc>,
}

impl LocationUpdate {
    pub fn new(latitude: f64, longitude: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            heading: None,
            speed: None,
            accuracy: None,
            battery: None,
            is_moving: None,
            updated_at,
        }
    }

    /// Reject samples outside the WGS84 coordinate range (NaN included).
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidLocation(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidLocation(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Payload of the `driver:location` event: the sample tagged with its driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub driver_id: String,
    #[serde(flatten)]
    pub update: LocationUpdate,
}

/// Why a public tracking link cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    Missing,
    Revoked,
    Expired,
}

impl fmt::Display for LinkRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Revoked => f.write_str("revoked"),
            Self::Expired => f.write_str("expired"),
        }
    }
}

/// Capability granting time-boxed, read-only access to a driver's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTrackingLink {
    pub token: String,
    pub driver_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl PublicTrackingLink {
    /// Check revocation first, then expiry.
    pub fn check_at(&self, now: DateTime<Utc>) -> std::result::Result<(), LinkRejection> {
        if self.revoked_at.is_some() {
            return Err(LinkRejection::Revoked);
        }
        if now >= self.expires_at {
            return Err(LinkRejection::Expired);
        }
        Ok(())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.check_at(now).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn offer(status: OfferStatus) -> RideOffer {
        RideOffer {
            id: "o1".into(),
            trip_id: "t1".into(),
            driver_id: "d1".into(),
            status,
            offered_at: t0(),
            expires_at: t0() + Duration::seconds(30),
            responded_at: None,
            trip: TripSummary::default(),
        }
    }

    #[test]
    fn pending_offer_is_actionable_until_expiry() {
        let o = offer(OfferStatus::Pending);
        assert!(o.is_actionable_at(t0()));
        assert!(o.is_actionable_at(t0() + Duration::seconds(29)));
        assert!(!o.is_actionable_at(t0() + Duration::seconds(30)));
    }

    #[test]
    fn terminal_offer_is_never_actionable() {
        for status in [
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Expired,
        ] {
            assert!(status.is_terminal());
            assert!(!offer(status).is_actionable_at(t0()));
        }
        assert!(!OfferStatus::Pending.is_terminal());
    }

    #[test]
    fn remaining_secs_rounds_up_and_clamps() {
        let o = offer(OfferStatus::Pending);
        assert_eq!(o.remaining_secs(t0()), 30);
        assert_eq!(o.remaining_secs(t0() + Duration::milliseconds(29_100)), 1);
        assert_eq!(o.remaining_secs(t0() + Duration::seconds(30)), 0);
        assert_eq!(o.remaining_secs(t0() + Duration::seconds(90)), 0);
    }

    #[test]
    fn offer_accepts_legacy_ride_field_names() {
        let json = r#"{
            "id": "o1",
            "rideId": "r9",
            "driverId": "d1",
            "status": "pending",
            "offeredAt": "2026-03-01T12:00:00Z",
            "expiresAt": "2026-03-01T12:00:30Z",
            "ride": { "pickupAddress": "1 Main St", "passengerCount": 2 }
        }"#;
        let o: RideOffer = serde_json::from_str(json).unwrap();
        assert_eq!(o.trip_id, "r9");
        assert_eq!(o.trip.pickup_address.as_deref(), Some("1 Main St"));
        assert_eq!(o.trip.passenger_count, Some(2));
        assert!(o.trip.estimated_fare.is_none());
    }

    #[test]
    fn location_validation_bounds() {
        assert!(LocationUpdate::new(90.0, -180.0, t0()).validate().is_ok());
        assert!(LocationUpdate::new(-90.0, 180.0, t0()).validate().is_ok());
        assert!(LocationUpdate::new(90.5, 0.0, t0()).validate().is_err());
        assert!(LocationUpdate::new(0.0, 181.0, t0()).validate().is_err());
        assert!(LocationUpdate::new(f64::NAN, 0.0, t0()).validate().is_err());
    }

    #[test]
    fn driver_location_uses_flat_wire_shape() {
        let event = DriverLocation {
            driver_id: "d1".into(),
            update: LocationUpdate {
                is_moving: Some(true),
                ..LocationUpdate::new(6.5244, 3.3792, t0())
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["driverId"], "d1");
        assert_eq!(value["lat"], 6.5244);
        assert_eq!(value["lng"], 3.3792);
        assert_eq!(value["isMoving"], true);
        assert!(value["heading"].is_null());

        let back: DriverLocation = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn tracking_link_validity() {
        let link = PublicTrackingLink {
            token: "tok".into(),
            driver_id: "d1".into(),
            trip_id: None,
            expires_at: t0() + Duration::minutes(10),
            revoked_at: None,
        };
        assert!(link.is_valid_at(t0()));
        assert_eq!(
            link.check_at(t0() + Duration::minutes(10)),
            Err(LinkRejection::Expired)
        );

        let revoked = PublicTrackingLink {
            revoked_at: Some(t0()),
            ..link
        };
        assert_eq!(revoked.check_at(t0()), Err(LinkRejection::Revoked));
    }
}
