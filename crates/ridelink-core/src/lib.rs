//! `RideLink` Core Library
//!
//! Shared functionality for `RideLink` components:
//! - Domain model for ride offers, location samples and tracking links
//! - Location channel wire protocol
//! - User-facing failure taxonomy
//! - Configuration resolution and tracing setup
//! - Common error types

pub mod config;
pub mod error;
pub mod failure;
pub mod model;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use failure::FailureCategory;
pub use model::{
    DriverLocation, LinkRejection, LocationUpdate, OfferDecision, OfferStatus,
    PublicTrackingLink, RideOffer, TripAssignment, TripSummary,
};
pub use protocol::{ClientEvent, Room, ServerEvent};
