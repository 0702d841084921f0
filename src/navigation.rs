//! Room presence and overflow handling.
//!
//! When a room is at capacity the service answers a navigation with
//! [`ReasonCode::RoomIsFull`]; the probe then asks for the next replica of
//! the same room at a fresh random spot, as many times as it takes.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{ProbeError, Result};
use crate::error_codes::ReasonCode;
use crate::presence::Presence;
use crate::protocol::Position;

/// Exclusive upper bound of either coordinate.
pub const POSITION_RANGE: u16 = 10_000;

/// Landing spot of the first navigation.
pub const ENTRY_POSITION: Position = Position::new(500, 500);

/// Replica requested by the first navigation.
pub const FIRST_REPLICA: u32 = 1;

/// Uniformly random position in `[0, POSITION_RANGE)` on both axes.
pub fn random_position<R: Rng + ?Sized>(rng: &mut R) -> Position {
    Position::new(
        rng.gen_range(0..POSITION_RANGE),
        rng.gen_range(0..POSITION_RANGE),
    )
}

/// What a navigation result meant for the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The probe is in the room.
    Arrived,
    /// The room was full; a new replica has been requested.
    Retrying { replica: u32 },
}

/// Where the probe is, or is trying to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPresence {
    destination: String,
    position: Position,
    replica: u32,
}

impl RoomPresence {
    /// Presence for the initial entry into `destination`.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            position: ENTRY_POSITION,
            replica: FIRST_REPLICA,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn replica(&self) -> u32 {
        self.replica
    }

    /// Request navigation to the current destination, position and replica.
    ///
    /// # Errors
    ///
    /// Propagates the immediate request error.
    pub fn navigate<P: Presence>(&self, presence: &P) -> Result<()> {
        debug!(
            destination = %self.destination,
            x = self.position.x,
            y = self.position.y,
            replica = self.replica,
            "navigating"
        );
        presence.navigate(&self.destination, self.position, self.replica)
    }

    /// Take a random step and move there. Movement is fire-and-forget.
    pub fn wander<P: Presence, R: Rng + ?Sized>(&mut self, presence: &P, rng: &mut R) {
        self.position = random_position(rng);
        if let Err(e) = presence.move_to(self.position) {
            debug!("move request not queued: {e}");
        }
    }

    /// Interpret a navigation result.
    ///
    /// # Errors
    ///
    /// Any non-zero reason other than room-full is fatal, as is failing to
    /// queue the retry.
    pub fn on_navigated<P: Presence, R: Rng + ?Sized>(
        &mut self,
        reason: ReasonCode,
        presence: &P,
        rng: &mut R,
    ) -> Result<NavigationOutcome> {
        if reason.is_ok() {
            info!(destination = %self.destination, replica = self.replica, "entered room");
            return Ok(NavigationOutcome::Arrived);
        }

        if !reason.is_room_full() {
            return Err(ProbeError::Navigation {
                destination: self.destination.clone(),
                reason,
            });
        }

        self.position = random_position(rng);
        self.replica = self.replica.saturating_add(1);
        warn!(
            destination = %self.destination,
            replica = self.replica,
            "room is full, trying next replica"
        );
        self.navigate(presence)?;
        Ok(NavigationOutcome::Retrying {
            replica: self.replica,
        })
    }
}
