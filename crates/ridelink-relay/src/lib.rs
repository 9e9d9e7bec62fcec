//! `RideLink` Relay Library
//!
//! Core functionality for the `RideLink` relay:
//! - Room hub fanning driver locations out to subscribers
//! - Location channel sessions over WebSocket and long-polling
//! - Driver-facing ride offer API and internal collaborator API
//! - Trip store interface with an in-memory implementation
//! - Background offer expiry and poll-session reaping

pub mod channel;
pub mod hub;
pub mod server;
pub mod store;
pub mod sweep;
