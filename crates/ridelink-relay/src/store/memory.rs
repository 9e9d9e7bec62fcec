//! In-process trip store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

use ridelink_core::{OfferDecision, OfferStatus, PublicTrackingLink, RideOffer};
use ridelink_crypto::FieldCipher;

use super::{NewOffer, NewTrackingLink, StoreError, TripStore};

/// Random bytes in a public tracking token.
const TOKEN_BYTES: usize = 32;

#[derive(Default)]
struct Tables {
    offers: HashMap<String, RideOffer>,
    links: HashMap<String, PublicTrackingLink>,
    /// Driver id to encrypted tax id envelope.
    tax_ids: HashMap<String, String>,
}

pub struct MemoryTripStore {
    tables: RwLock<Tables>,
    cipher: FieldCipher,
}

impl MemoryTripStore {
    pub fn new(cipher: FieldCipher) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            cipher,
        }
    }

    /// Insert a link as-is. Used to seed fixtures.
    pub async fn insert_tracking_link(&self, link: PublicTrackingLink) {
        self.tables
            .write()
            .await
            .links
            .insert(link.token.clone(), link);
    }

    /// Raw stored tax id envelope, for inspection.
    pub async fn stored_tax_id(&self, driver_id: &str) -> Option<String> {
        self.tables.read().await.tax_ids.get(driver_id).cloned()
    }

    pub async fn offer(&self, offer_id: &str) -> Option<RideOffer> {
        self.tables.read().await.offers.get(offer_id).cloned()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn ttl(secs: u32) -> Result<Duration, StoreError> {
    if secs == 0 {
        return Err(StoreError::InvalidInput("ttlSecs must be positive".into()));
    }
    Ok(Duration::seconds(i64::from(secs)))
}

fn require_id(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn resolve_public_tracking_link(
        &self,
        token: &str,
    ) -> Result<Option<PublicTrackingLink>, StoreError> {
        Ok(self.tables.read().await.links.get(token).cloned())
    }

    async fn create_tracking_link(
        &self,
        params: NewTrackingLink,
        now: DateTime<Utc>,
    ) -> Result<PublicTrackingLink, StoreError> {
        require_id("driverId", &params.driver_id)?;
        let link = PublicTrackingLink {
            token: generate_token(),
            driver_id: params.driver_id,
            trip_id: params.trip_id,
            expires_at: now + ttl(params.ttl_secs)?,
            revoked_at: None,
        };
        self.tables
            .write()
            .await
            .links
            .insert(link.token.clone(), link.clone());
        info!(driver_id = %link.driver_id, trip_id = ?link.trip_id, "Tracking link issued");
        Ok(link)
    }

    async fn revoke_tracking_link(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PublicTrackingLink, StoreError> {
        let mut tables = self.tables.write().await;
        let link = tables
            .links
            .get_mut(token)
            .ok_or_else(|| StoreError::NotFound("tracking link".into()))?;
        if link.revoked_at.is_none() {
            link.revoked_at = Some(now);
            info!(driver_id = %link.driver_id, "Tracking link revoked");
        }
        Ok(link.clone())
    }

    async fn create_offer(
        &self,
        params: NewOffer,
        now: DateTime<Utc>,
    ) -> Result<RideOffer, StoreError> {
        require_id("tripId", &params.trip_id)?;
        require_id("driverId", &params.driver_id)?;
        let window = ttl(params.ttl_secs)?;

        let mut tables = self.tables.write().await;
        for existing in tables.offers.values_mut() {
            if existing.driver_id != params.driver_id || existing.status.is_terminal() {
                continue;
            }
            if now < existing.expires_at {
                return Err(StoreError::DriverBusy {
                    driver_id: params.driver_id,
                });
            }
            existing.status = OfferStatus::Expired;
            existing.responded_at = Some(now);
        }

        let offer = RideOffer {
            id: uuid::Uuid::new_v4().to_string(),
            trip_id: params.trip_id,
            driver_id: params.driver_id,
            status: OfferStatus::Pending,
            offered_at: now,
            expires_at: now + window,
            responded_at: None,
            trip: params.trip,
        };
        tables.offers.insert(offer.id.clone(), offer.clone());
        info!(
            offer_id = %offer.id,
            trip_id = %offer.trip_id,
            driver_id = %offer.driver_id,
            "Ride offer created"
        );
        Ok(offer)
    }

    async fn pending_offer_for_driver(
        &self,
        driver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RideOffer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .offers
            .values()
            .filter(|o| o.driver_id == driver_id && o.is_actionable_at(now))
            .max_by_key(|o| o.offered_at)
            .cloned())
    }

    async fn respond_to_offer(
        &self,
        driver_id: &str,
        offer_id: &str,
        decision: OfferDecision,
        now: DateTime<Utc>,
    ) -> Result<RideOffer, StoreError> {
        let mut tables = self.tables.write().await;
        let offer = tables
            .offers
            .get_mut(offer_id)
            .ok_or_else(|| StoreError::NotFound(format!("offer {offer_id}")))?;

        if offer.driver_id != driver_id {
            return Err(StoreError::WrongDriver {
                offer_id: offer_id.to_string(),
            });
        }
        if offer.status.is_terminal() {
            return Err(StoreError::NotPending {
                offer_id: offer_id.to_string(),
                status: offer.status,
            });
        }
        if now >= offer.expires_at {
            offer.status = OfferStatus::Expired;
            offer.responded_at = Some(now);
            return Err(StoreError::Expired {
                offer_id: offer_id.to_string(),
            });
        }

        offer.status = decision.resulting_status();
        offer.responded_at = Some(now);
        let answered = offer.clone();

        if decision == OfferDecision::Accept {
            let mut superseded = 0usize;
            for other in tables.offers.values_mut() {
                if other.trip_id == answered.trip_id
                    && other.id != answered.id
                    && other.status == OfferStatus::Pending
                {
                    other.status = OfferStatus::Expired;
                    other.responded_at = Some(now);
                    superseded += 1;
                }
            }
            debug!(trip_id = %answered.trip_id, superseded, "Expired competing offers");
        }

        info!(
            offer_id,
            driver_id,
            status = %answered.status,
            "Ride offer answered"
        );
        Ok(answered)
    }

    async fn expire_stale_offers(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut expired = 0u64;
        for offer in tables.offers.values_mut() {
            if offer.status == OfferStatus::Pending && now >= offer.expires_at {
                offer.status = OfferStatus::Expired;
                offer.responded_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn store_driver_tax_id(&self, driver_id: &str, tax_id: &str) -> Result<(), StoreError> {
        require_id("driverId", driver_id)?;
        require_id("taxId", tax_id)?;
        let envelope = self.cipher.encrypt(tax_id)?;
        self.tables
            .write()
            .await
            .tax_ids
            .insert(driver_id.to_string(), envelope);
        Ok(())
    }

    async fn driver_tax_id_masked(&self, driver_id: &str) -> Result<Option<String>, StoreError> {
        let tables = self.tables.read().await;
        let stored = tables.tax_ids.get(driver_id).map(String::as_str);
        Ok(self.cipher.mask_tax_id(stored)?)
    }
}
