//! Events delivered by [`PresenceClient`](crate::client::PresenceClient).
//!
//! Every [`ServerMessage`] maps onto exactly one [`PresenceEvent`]. The
//! transport loop adds one synthetic event of its own,
//! [`PresenceEvent::Disconnected`], which is always the last event on the
//! channel.

use crate::error_codes::ReasonCode;
use crate::protocol::{Attribute, MemberInfo, Position, ServerMessage};

/// A lifecycle or message notification from the presence service.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// The link is up; carries the community attribute enumeration.
    Connected { attributes: Vec<Attribute> },
    /// Place-level sign-on completed.
    PlaceConnected { member: MemberInfo },
    /// The service refused the sign-on.
    SignOnFailed { reason: ReasonCode, message: String },
    /// A navigation request completed (successfully or not).
    Navigated {
        requested: Option<Position>,
        reason: ReasonCode,
        title: String,
    },
    /// A private message arrived.
    Whispered { from: MemberInfo, text: String },
    /// Room chat from another member.
    ChatReceived { from: MemberInfo, text: String },
    /// The place layer is tearing the session down.
    Disconnecting { reason: ReasonCode },
    /// Heartbeat response.
    Pong,
    /// The service reported an error that is not tied to a request.
    Error {
        message: String,
        reason: Option<ReasonCode>,
    },
    /// The transport loop exited. `None` means the service closed the link
    /// cleanly; `Some` carries the failure or shutdown reason.
    Disconnected { reason: Option<String> },
}

impl From<ServerMessage> for PresenceEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Welcome { attributes } => Self::Connected { attributes },
            ServerMessage::SignedOn { member } => Self::PlaceConnected { member },
            ServerMessage::SignOnFailed { reason, message } => {
                Self::SignOnFailed { reason, message }
            }
            ServerMessage::Navigated {
                requested,
                reason,
                title,
            } => Self::Navigated {
                requested,
                reason,
                title,
            },
            ServerMessage::Whispered { from, text } => Self::Whispered { from, text },
            ServerMessage::Chat { from, text } => Self::ChatReceived { from, text },
            ServerMessage::Disconnecting { reason, .. } => Self::Disconnecting { reason },
            ServerMessage::Pong => Self::Pong,
            ServerMessage::Error { message, reason } => Self::Error { message, reason },
        }
    }
}
