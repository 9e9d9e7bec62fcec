//! Trip store interface used by the relay.
//!
//! The production store (trips, offers, tracking links, driver profiles) is an
//! external service. The relay talks to it through [`TripStore`]; the bundled
//! [`MemoryTripStore`] backs local runs and tests.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use ridelink_core::{OfferDecision, OfferStatus, PublicTrackingLink, RideOffer, TripSummary};
use ridelink_crypto::CryptoError;

pub use memory::MemoryTripStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Offer {offer_id} belongs to another driver")]
    WrongDriver { offer_id: String },

    #[error("Offer {offer_id} is already {status}")]
    NotPending {
        offer_id: String,
        status: OfferStatus,
    },

    #[error("Offer {offer_id} has expired")]
    Expired { offer_id: String },

    #[error("Driver {driver_id} already has a pending offer")]
    DriverBusy { driver_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Trip store unavailable: {0}")]
    Unavailable(String),
}

/// Parameters for offering a trip to a driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOffer {
    pub trip_id: String,
    pub driver_id: String,
    /// How long the driver has to answer.
    pub ttl_secs: u32,
    #[serde(default)]
    pub trip: TripSummary,
}

/// Parameters for issuing a public tracking link.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackingLink {
    pub driver_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub ttl_secs: u32,
}

#[async_trait]
pub trait TripStore: Send + Sync {
    /// Look up a public tracking link by token. `Ok(None)` means no such token.
    async fn resolve_public_tracking_link(
        &self,
        token: &str,
    ) -> Result<Option<PublicTrackingLink>, StoreError>;

    async fn create_tracking_link(
        &self,
        params: NewTrackingLink,
        now: DateTime<Utc>,
    ) -> Result<PublicTrackingLink, StoreError>;

    /// Mark a link revoked. Revoking twice keeps the first timestamp.
    async fn revoke_tracking_link(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PublicTrackingLink, StoreError>;

    async fn create_offer(
        &self,
        params: NewOffer,
        now: DateTime<Utc>,
    ) -> Result<RideOffer, StoreError>;

    /// The driver's current pending, unexpired offer if any.
    async fn pending_offer_for_driver(
        &self,
        driver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RideOffer>, StoreError>;

    /// Record a driver's answer. Accepting also expires every other pending
    /// offer for the same trip.
    async fn respond_to_offer(
        &self,
        driver_id: &str,
        offer_id: &str,
        decision: OfferDecision,
        now: DateTime<Utc>,
    ) -> Result<RideOffer, StoreError>;

    /// Expire every pending offer past its deadline. Returns how many changed.
    async fn expire_stale_offers(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Store a driver's tax id encrypted at rest.
    async fn store_driver_tax_id(&self, driver_id: &str, tax_id: &str) -> Result<(), StoreError>;

    /// Last four characters of the stored tax id.
    async fn driver_tax_id_masked(&self, driver_id: &str) -> Result<Option<String>, StoreError>;
}
