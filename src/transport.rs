//! Transport abstraction for the presence service.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the probe and the service. The protocol uses JSON text messages, so every
//! transport implementation must handle message framing internally.
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait. Construct a connected
//! transport externally (for example with
//! [`WebSocketTransport::connect_with_timeout`](crate::transports::WebSocketTransport::connect_with_timeout)),
//! then pass it to `PresenceClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use presence_probe::error::ProbeError;
//! use presence_probe::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ProbeError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ProbeError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ProbeError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ProbeError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. Channel-based implementations (e.g. wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the service.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), ProbeError>;

    /// Receive the next JSON text message from the service.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the service
    async fn recv(&mut self) -> Option<Result<String, ProbeError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ProbeError>;
}
