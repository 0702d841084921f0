//! The capability set the probe needs from the presence service.
//!
//! Every method returns immediately: `Ok` means the request was accepted for
//! delivery, not that the service acted on it. Outcomes that the service
//! reports later (sign-on, navigation, echoes) arrive as
//! [`PresenceEvent`](crate::event::PresenceEvent)s.
//!
//! [`PresenceClient`](crate::client::PresenceClient) is the production
//! implementation; tests substitute a recorder.

use crate::error::Result;
use crate::protocol::{MemberId, Position};

/// Requests the probe issues against its place.
pub trait Presence {
    /// Sign on with a local identity.
    fn sign_on(&self, name: &str, password: &str) -> Result<()>;

    /// Navigate to `destination`, landing at `position` in replica `replica`.
    fn navigate(&self, destination: &str, position: Position, replica: u32) -> Result<()>;

    /// Private message to one member (the probe whispers to itself).
    fn whisper(&self, to: MemberId, text: &str) -> Result<()>;

    /// Room-wide chat.
    fn chat(&self, text: &str) -> Result<()>;

    /// Move within the current room.
    fn move_to(&self, position: Position) -> Result<()>;

    /// Replace the avatar image.
    fn set_face(&self, image: Vec<u8>) -> Result<()>;
}

impl<T: Presence + ?Sized> Presence for &T {
    fn sign_on(&self, name: &str, password: &str) -> Result<()> {
        (**self).sign_on(name, password)
    }

    fn navigate(&self, destination: &str, position: Position, replica: u32) -> Result<()> {
        (**self).navigate(destination, position, replica)
    }

    fn whisper(&self, to: MemberId, text: &str) -> Result<()> {
        (**self).whisper(to, text)
    }

    fn chat(&self, text: &str) -> Result<()> {
        (**self).chat(text)
    }

    fn move_to(&self, position: Position) -> Result<()> {
        (**self).move_to(position)
    }

    fn set_face(&self, image: Vec<u8>) -> Result<()> {
        (**self).set_face(image)
    }
}
