//! User-facing failure taxonomy.
//!
//! [`FailureCategory::classify`] is total and pure: every failure maps to
//! exactly one category, and user-visible text comes from the category only,
//! never from the raw error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a failed network interaction, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Offline,
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    ServerError,
    Unknown,
}

/// Message fragments produced by HTTP stacks when the network is unreachable.
const OFFLINE_PATTERNS: &[&str] = &[
    "failed to fetch",
    "networkerror",
    "network error",
    "connection refused",
    "connection reset",
    "dns error",
    "error sending request",
];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out"];

impl FailureCategory {
    /// Classify a failure from the device's offline flag, the HTTP status (if
    /// a response was received) and the error message.
    ///
    /// Precedence: offline flag, then status code, then message pattern.
    pub fn classify(offline: bool, status: Option<u16>, message: &str) -> Self {
        if offline {
            return Self::Offline;
        }
        match status {
            Some(401) => return Self::Unauthorized,
            Some(403) => return Self::Forbidden,
            Some(404) => return Self::NotFound,
            Some(429) => return Self::RateLimited,
            Some(s) if s >= 500 => return Self::ServerError,
            _ => {}
        }
        let lowered = message.to_ascii_lowercase();
        if TIMEOUT_PATTERNS.iter().any(|p| lowered.contains(p)) {
            return Self::Timeout;
        }
        if OFFLINE_PATTERNS.iter().any(|p| lowered.contains(p)) {
            return Self::Offline;
        }
        Self::Unknown
    }

    /// Stable user-facing text for the category.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Offline => "You appear to be offline. Please check your internet connection.",
            Self::Timeout => "Request timed out. Please try again.",
            Self::Unauthorized => "Your session has expired. Please sign in again.",
            Self::Forbidden => "You don't have permission to perform this action.",
            Self::NotFound => "The requested resource was not found.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::ServerError => "Server error. Please try again later.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_flag_wins() {
        assert_eq!(
            FailureCategory::classify(true, Some(500), "timeout"),
            FailureCategory::Offline
        );
    }

    #[test]
    fn status_codes_map_to_categories() {
        let cases = [
            (401, FailureCategory::Unauthorized),
            (403, FailureCategory::Forbidden),
            (404, FailureCategory::NotFound),
            (429, FailureCategory::RateLimited),
            (500, FailureCategory::ServerError),
            (503, FailureCategory::ServerError),
        ];
        for (status, expected) in cases {
            assert_eq!(FailureCategory::classify(false, Some(status), ""), expected);
        }
    }

    #[test]
    fn unmapped_client_error_falls_through_to_message() {
        assert_eq!(
            FailureCategory::classify(false, Some(400), "bad request"),
            FailureCategory::Unknown
        );
        assert_eq!(
            FailureCategory::classify(false, Some(409), "operation timed out"),
            FailureCategory::Timeout
        );
    }

    #[test]
    fn message_patterns() {
        assert_eq!(
            FailureCategory::classify(false, None, "TypeError: Failed to fetch"),
            FailureCategory::Offline
        );
        assert_eq!(
            FailureCategory::classify(false, None, "error sending request for url"),
            FailureCategory::Offline
        );
        assert_eq!(
            FailureCategory::classify(false, None, "request timeout after 30s"),
            FailureCategory::Timeout
        );
        assert_eq!(
            FailureCategory::classify(false, None, "something odd"),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn user_messages_never_leak_raw_text() {
        let category = FailureCategory::classify(false, Some(500), "db password=hunter2");
        assert!(!category.user_message().contains("hunter2"));
        assert_eq!(category.user_message(), "Server error. Please try again later.");
    }
}
