//! Connection lifecycle of the single probe session.
//!
//! ```text
//! Connecting ──(place connected)──▶ Connected
//!     │                                 │
//!     └──────(disconnecting / sign-on failure)──▶ Disconnected
//! ```
//!
//! Transitions are driven only by presence events. `Disconnected` is
//! terminal: once there, the driver stops and the process exits.

use tracing::{error, info, warn};

use crate::error::{ProbeError, Result};
use crate::error_codes::ReasonCode;
use crate::presence::Presence;
use crate::protocol::{find_attribute, Attribute, AttributeId, MemberId, MemberInfo};

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Connected,
    Disconnected,
}

/// The one logical connection this process holds.
#[derive(Debug)]
pub struct Session {
    phase: Phase,
    name: String,
    password: String,
    member: Option<MemberInfo>,
    community: Option<String>,
    lobby_url: Option<String>,
    entered_room: bool,
}

impl Session {
    /// A session whose connect request has just been issued.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            phase: Phase::Connecting,
            name: name.into(),
            password: password.into(),
            member: None,
            community: None,
            lobby_url: None,
            entered_room: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member id assigned at sign-on.
    pub fn member_id(&self) -> Option<MemberId> {
        self.member.as_ref().map(|member| member.id)
    }

    pub fn community(&self) -> Option<&str> {
        self.community.as_deref()
    }

    /// Default destination advertised by the community.
    pub fn lobby_url(&self) -> Option<&str> {
        self.lobby_url.as_deref()
    }

    pub fn has_entered_room(&self) -> bool {
        self.entered_room
    }

    /// The link is up: record the community attributes and sign on.
    ///
    /// # Errors
    ///
    /// If the sign-on request cannot be issued the session is disconnected
    /// and the request error is returned.
    pub fn on_connected<P: Presence>(
        &mut self,
        attributes: &[Attribute],
        presence: &P,
    ) -> Result<()> {
        if self.phase != Phase::Connecting {
            warn!(phase = ?self.phase, "ignoring link-up outside of Connecting");
            return Ok(());
        }

        if let Some(community) = find_attribute(attributes, AttributeId::CommunityName) {
            info!(community, "community");
            self.community = Some(community.to_string());
        }
        if let Some(lobby) = find_attribute(attributes, AttributeId::LobbyUrl) {
            info!(lobby, "lobby URL");
            self.lobby_url = Some(lobby.to_string());
        }

        if let Err(e) = presence.sign_on(&self.name, &self.password) {
            error!(name = %self.name, "cannot sign-on: {e}");
            self.phase = Phase::Disconnected;
            return Err(e);
        }
        Ok(())
    }

    /// The service refused the sign-on.
    pub fn on_sign_on_failed(&mut self, reason: ReasonCode, message: &str) -> ProbeError {
        error!(name = %self.name, code = reason.code(), "cannot sign-on: {message}");
        self.phase = Phase::Disconnected;
        ProbeError::SignOnRejected {
            reason,
            message: message.to_string(),
        }
    }

    /// Place-level sign-on completed. Returns `true` when this notification
    /// moved the session to Connected, i.e. when the timer must be armed.
    pub fn on_place_connected(&mut self, member: MemberInfo) -> bool {
        if self.phase != Phase::Connecting {
            return false;
        }
        info!(name = %member.name, id = %member.id, "signed on");
        self.member = Some(member);
        self.phase = Phase::Connected;
        true
    }

    /// The transport or place layer is tearing the session down.
    ///
    /// # Errors
    ///
    /// A non-zero reason is an error exit.
    pub fn on_disconnecting(&mut self, reason: ReasonCode) -> Result<()> {
        self.phase = Phase::Disconnected;
        if reason.is_ok() {
            info!(name = %self.name, "signed off");
            Ok(())
        } else {
            error!(name = %self.name, code = reason.code(), "signed off: {reason}");
            Err(ProbeError::Disconnected(reason.to_string()))
        }
    }

    /// The transport loop ended. `None` is a clean close.
    ///
    /// # Errors
    ///
    /// Any reported reason is an error exit.
    pub fn on_link_lost(&mut self, reason: Option<String>) -> Result<()> {
        self.phase = Phase::Disconnected;
        match reason {
            None => {
                info!("service closed the connection");
                Ok(())
            }
            Some(reason) => {
                error!("disconnected: {reason}");
                Err(ProbeError::Disconnected(reason))
            }
        }
    }

    /// Latch room entry. Returns `true` exactly once per session.
    pub fn enter_room_once(&mut self) -> bool {
        if self.entered_room {
            return false;
        }
        self.entered_room = true;
        true
    }
}
