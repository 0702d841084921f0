//! Result codes reported by the presence service.
//!
//! Every asynchronous notification that can fail (sign-on, navigation,
//! disconnect) carries a [`ReasonCode`]. Codes serialize using
//! `SCREAMING_SNAKE_CASE` (e.g. `"ROOM_IS_FULL"`) and also map to the numeric
//! values operators see in diagnostics, where `0` means success.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured result codes returned by the presence service.
///
/// [`ReasonCode::Ok`] is the "zero" reason: a disconnect carrying it is a clean,
/// operator- or self-initiated exit, and a navigation carrying it succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    #[default]
    Ok,

    // Sign-on errors
    InvalidCredentials,
    AccessDenied,
    AlreadySignedOn,
    VersionRejected,

    // Navigation errors
    RoomIsFull,
    RoomNotFound,
    InvalidDestination,

    // Session teardown
    SignedOffByServer,
    IdleTimeout,
    ServerShutdown,

    // Transport and service errors
    ProtocolError,
    ServiceUnavailable,
    InternalError,

    /// Any code this client does not know. Never the zero reason.
    #[serde(other)]
    Unknown,
}

impl ReasonCode {
    /// Numeric code, as printed in operator diagnostics.
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::InvalidCredentials => 101,
            Self::AccessDenied => 102,
            Self::AlreadySignedOn => 103,
            Self::VersionRejected => 104,
            Self::RoomIsFull => 201,
            Self::RoomNotFound => 202,
            Self::InvalidDestination => 203,
            Self::SignedOffByServer => 301,
            Self::IdleTimeout => 302,
            Self::ServerShutdown => 303,
            Self::ProtocolError => 401,
            Self::ServiceUnavailable => 402,
            Self::InternalError => 500,
            Self::Unknown => 999,
        }
    }

    /// Returns `true` for the zero (success) reason.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` when the target room has reached capacity and a new
    /// replica must be requested.
    pub fn is_room_full(&self) -> bool {
        matches!(self, Self::RoomIsFull)
    }

    /// Returns a human-readable description of this code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ok => "Success.",

            Self::InvalidCredentials => "The user name or password was not accepted.",
            Self::AccessDenied => "This user is not allowed to sign on to the community.",
            Self::AlreadySignedOn => "This user is already signed on from another session.",
            Self::VersionRejected => "The client version string was rejected by the service.",

            Self::RoomIsFull => {
                "The room has reached its capacity. Request another replica of the room."
            }
            Self::RoomNotFound => "The requested room does not exist.",
            Self::InvalidDestination => "The destination is malformed or not navigable.",

            Self::SignedOffByServer => "The service signed this user off.",
            Self::IdleTimeout => "The session was closed after being idle too long.",
            Self::ServerShutdown => "The service is shutting down.",

            Self::ProtocolError => "The service could not understand a message from this client.",
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
            Self::InternalError => "An internal service error occurred.",

            Self::Unknown => "The service reported a result code this client does not know.",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_the_zero_reason() {
        assert_eq!(ReasonCode::Ok.code(), 0);
        assert!(ReasonCode::Ok.is_ok());
        assert_eq!(ReasonCode::default(), ReasonCode::Ok);
        assert!(!ReasonCode::RoomIsFull.is_ok());
    }

    #[test]
    fn only_room_is_full_requests_a_replica() {
        assert!(ReasonCode::RoomIsFull.is_room_full());
        assert!(!ReasonCode::RoomNotFound.is_room_full());
        assert!(!ReasonCode::Ok.is_room_full());
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ReasonCode::RoomIsFull).unwrap();
        assert_eq!(json, "\"ROOM_IS_FULL\"");
        let back: ReasonCode = serde_json::from_str("\"SIGNED_OFF_BY_SERVER\"").unwrap();
        assert_eq!(back, ReasonCode::SignedOffByServer);
    }

    #[test]
    fn unlisted_codes_are_unknown_failures() {
        let reason: ReasonCode = serde_json::from_str("\"KICKED_BY_ADMIN\"").unwrap();
        assert_eq!(reason, ReasonCode::Unknown);
        assert!(!reason.is_ok());
        assert!(!reason.is_room_full());
        assert_ne!(reason.code(), 0);
    }

    #[test]
    fn display_includes_numeric_code() {
        let shown = ReasonCode::RoomNotFound.to_string();
        assert!(shown.ends_with("(202)"), "got {shown}");
    }
}
