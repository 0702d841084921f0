//! # Presence Probe
//!
//! Synthetic load and latency probe for a presence-based chat service.
//!
//! The probe signs on as a single member, enters a room, and on every tick
//! whispers itself a timestamped message. When the whisper comes back the
//! round-trip delay is compared against a threshold and lag is reported to
//! the room or the log. In between it wanders around, quotes a fortune
//! corpus now and then, and relays private messages from others into the
//! room, which makes it useful as background load as well.
//!
//! ## Layout
//!
//! - [`protocol`], [`error_codes`]: JSON wire messages and reason codes
//! - [`transport`], `transports`: the [`Transport`] trait and its WebSocket
//!   implementation (default `transport-websocket` feature)
//! - [`client`], [`event`]: the [`PresenceClient`] handle, its background
//!   transport loop and the typed [`PresenceEvent`]s it emits
//! - [`session`], [`scheduler`], [`latency`], [`navigation`], [`quotes`]:
//!   the probe's state, each against the narrow [`Presence`] trait
//! - [`probe`]: the owned [`Probe`] context and the [`probe::run`] loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presence_probe::{Probe, ProbeConfig, PresenceClient, PresenceConfig, WebSocketTransport};
//! use presence_probe::quotes::QuoteCorpus;
//!
//! let config = ProbeConfig::new("probe1", "secret", "ws://chat.example:7777");
//! let transport = WebSocketTransport::connect(&config.community_url).await?;
//! let (client, mut events) = PresenceClient::start(transport, PresenceConfig::new());
//! let mut probe = Probe::new(config, QuoteCorpus::default(), &client);
//! let outcome = presence_probe::probe::run(&mut probe, &mut events, std::future::pending()).await;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod latency;
pub mod navigation;
pub mod presence;
pub mod probe;
pub mod protocol;
pub mod quotes;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{PresenceClient, PresenceConfig};
pub use config::{LagReporting, ProbeConfig};
pub use error::{ProbeError, Result};
pub use error_codes::ReasonCode;
pub use event::PresenceEvent;
pub use presence::Presence;
pub use probe::{Probe, ProbeOutcome};
pub use protocol::{ClientMessage, ServerMessage};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
