//! Ride offer HTTP API client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use ridelink_core::{RideOffer, TripAssignment};

use crate::retry::RequestError;

/// Header carrying the driver identity; the relay's auth layer sets the same.
pub const DRIVER_ID_HEADER: &str = "x-driver-id";

/// The driver-facing offer endpoints. Each call is a single attempt; callers
/// wrap them in [`crate::retry::execute`].
#[async_trait]
pub trait OfferApi: Send + Sync {
    /// `null` from the server maps to `None`.
    async fn pending_offer(&self) -> Result<Option<RideOffer>, RequestError>;

    async fn accept_offer(&self, offer_id: &str) -> Result<TripAssignment, RequestError>;

    async fn decline_offer(&self, offer_id: &str) -> Result<(), RequestError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct HttpOfferApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOfferApi {
    pub fn new(base_url: &str, driver_id: &str) -> Result<Self, RequestError> {
        if base_url.is_empty() {
            return Err(RequestError::Transport("relay url is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let id = HeaderValue::from_str(driver_id)
            .map_err(|_| RequestError::Transport("Invalid driver id header value".into()))?;
        headers.insert(DRIVER_ID_HEADER, id);

        // reqwest is built with rustls-no-provider; an Err here means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/ride-offers{path}", self.base_url)
    }

    /// Turn non-success responses into [`RequestError::Status`], keeping the
    /// server's error text when it sent one.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RequestError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
        let message = resp
            .json::<ErrorBody>()
            .await
            .map_or(fallback, |body| body.error);
        Err(RequestError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl OfferApi for HttpOfferApi {
    async fn pending_offer(&self) -> Result<Option<RideOffer>, RequestError> {
        let resp = self.http.get(self.url("/pending")).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn accept_offer(&self, offer_id: &str) -> Result<TripAssignment, RequestError> {
        let resp = self
            .http
            .post(self.url("/accept"))
            .json(&json!({ "offerId": offer_id }))
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn decline_offer(&self, offer_id: &str) -> Result<(), RequestError> {
        let resp = self
            .http
            .post(self.url("/decline"))
            .json(&json!({ "offerId": offer_id }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}
