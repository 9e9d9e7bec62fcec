//! `RideLink` Driver Library
//!
//! Client-side pieces running on driver and rider devices:
//! - Resilient request execution with timeout and backoff
//! - Ride offer HTTP API client
//! - Pending-offer poller with accept/decline actions
//! - Location channel client over WebSocket or long-polling

pub mod api;
pub mod channel;
pub mod offers;
pub mod retry;
