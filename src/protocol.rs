//! Wire protocol types for the presence service.
//!
//! Messages are JSON text frames, adjacently tagged as
//! `{"type": "Variant", "data": {...}}`. Key conventions:
//!
//! - Member identifiers are UUIDs.
//! - Avatar images travel as byte arrays via `serde_bytes`.
//! - Every fallible notification carries a [`ReasonCode`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_codes::ReasonCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for a signed-on member.
pub type MemberId = Uuid;

// ── Structs ─────────────────────────────────────────────────────────

/// A 2D position inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Identity of a member as seen by other members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: MemberId,
    pub name: String,
}

/// Identifier of a community attribute advertised on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Display name of the community.
    CommunityName,
    /// Default destination for members that did not request a room.
    LobbyUrl,
    /// Any attribute this client does not interpret.
    #[serde(other)]
    Unknown,
}

/// One entry of the attribute enumeration sent when the link comes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub value: String,
}

impl Attribute {
    pub fn new(id: AttributeId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Looks up the first attribute with the given id.
pub fn find_attribute(attributes: &[Attribute], id: AttributeId) -> Option<&str> {
    attributes
        .iter()
        .find(|attr| attr.id == id)
        .map(|attr| attr.value.as_str())
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Sign on to the place layer with a local identity.
    SignOn {
        name: String,
        password: String,
        /// Client version string advertised to the service.
        #[serde(skip_serializing_if = "Option::is_none")]
        app_version: Option<String>,
    },
    /// Navigate to a destination, optionally at a position and in a
    /// specific replica of the room.
    Navigate {
        destination: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
        replica: u32,
    },
    /// Private message to a single member.
    Whisper { to: MemberId, text: String },
    /// Room-wide chat.
    Chat { text: String },
    /// Move the avatar within the current room.
    Move { position: Position },
    /// Replace the avatar image.
    SetFace {
        #[serde(with = "serde_bytes")]
        image: Vec<u8>,
    },
    /// Sign off voluntarily.
    SignOff,
    /// Heartbeat to maintain connection.
    Ping,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Link established; attribute enumeration of the community.
    Welcome {
        #[serde(default)]
        attributes: Vec<Attribute>,
    },
    /// Place-level sign-on completed.
    SignedOn { member: MemberInfo },
    /// Sign-on was refused.
    SignOnFailed {
        reason: ReasonCode,
        #[serde(default)]
        message: String,
    },
    /// Result of a navigation request.
    Navigated {
        #[serde(skip_serializing_if = "Option::is_none")]
        requested: Option<Position>,
        reason: ReasonCode,
        #[serde(default)]
        title: String,
    },
    /// A private message addressed to this member.
    Whispered { from: MemberInfo, text: String },
    /// Room chat from another member.
    Chat { from: MemberInfo, text: String },
    /// The place layer is tearing the session down.
    Disconnecting {
        reason: ReasonCode,
        /// Session duration in seconds, if reported.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
    },
    /// Pong response to ping.
    Pong,
    /// Error message.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<ReasonCode>,
    },
}
