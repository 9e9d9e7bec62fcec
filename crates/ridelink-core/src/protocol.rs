//! Location channel wire protocol.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! Frames are decoded into tagged enums and validated here, at the transport
//! boundary, before any application logic sees them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::DriverLocation;

/// Longest identifier or token accepted in a room name.
pub const MAX_ROOM_KEY_LEN: usize = 256;

/// A named broadcast group on the location hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// Everyone watching one driver (dispatch, admin).
    Driver(String),
    /// Everyone watching one active trip (the rider).
    Trip(String),
    /// Anonymous viewers holding a public tracking token.
    Token(String),
}

impl Room {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Driver(_) => "driver",
            Self::Trip(_) => "trip",
            Self::Token(_) => "token",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Driver(k) | Self::Trip(k) | Self::Token(k) => k,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

impl FromStr for Room {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, key) = s
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("room name without kind: {s}")))?;
        validate_key(key)?;
        match kind {
            "driver" => Ok(Self::Driver(key.to_string())),
            "trip" => Ok(Self::Trip(key.to_string())),
            "token" => Ok(Self::Token(key.to_string())),
            other => Err(Error::Protocol(format!("unknown room kind: {other}"))),
        }
    }
}

/// Events sent by a subscriber to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join:driver")]
    JoinDriver(String),
    #[serde(rename = "join:trip")]
    JoinTrip(String),
    #[serde(rename = "join:publicToken")]
    JoinPublicToken(String),
    #[serde(rename = "leave:driver")]
    LeaveDriver(String),
    #[serde(rename = "leave:trip")]
    LeaveTrip(String),
}

impl ClientEvent {
    /// Decode and validate a frame received from a subscriber.
    pub fn from_json(text: &str) -> Result<Self> {
        let event: Self = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("undecodable client event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key(self.key())
    }

    /// The raw id or token carried by the event.
    pub fn key(&self) -> &str {
        match self {
            Self::JoinDriver(k)
            | Self::JoinTrip(k)
            | Self::JoinPublicToken(k)
            | Self::LeaveDriver(k)
            | Self::LeaveTrip(k) => k,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinDriver(_) => "join:driver",
            Self::JoinTrip(_) => "join:trip",
            Self::JoinPublicToken(_) => "join:publicToken",
            Self::LeaveDriver(_) => "leave:driver",
            Self::LeaveTrip(_) => "leave:trip",
        }
    }
}

/// Events pushed by the hub to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "driver:location")]
    DriverLocation(DriverLocation),
    /// Sent only to the connection whose public-token join was rejected.
    #[serde(rename = "token:invalid")]
    TokenInvalid { token: String },
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("undecodable server event: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::DriverLocation(_) => "driver:location",
            Self::TokenInvalid { .. } => "token:invalid",
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::Protocol("empty room key".into()));
    }
    if key.len() > MAX_ROOM_KEY_LEN {
        return Err(Error::Protocol(format!(
            "room key longer than {MAX_ROOM_KEY_LEN} bytes"
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::Protocol("room key contains control characters".into()));
    }
    Ok(())
}
