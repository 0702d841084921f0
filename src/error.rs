//! Error types for the presence probe.

use thiserror::Error;

use crate::error_codes::ReasonCode;

/// Errors that can occur while probing a presence service.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The service refused the sign-on request.
    #[error("cannot sign-on ({}): {message}", reason.code())]
    SignOnRejected {
        /// Result code reported by the service.
        reason: ReasonCode,
        /// Human-readable detail, if the service sent one.
        message: String,
    },

    /// A navigation request failed for a reason other than room-full.
    #[error("navigation to {destination} failed ({})", reason.code())]
    Navigation {
        /// Destination that was requested.
        destination: String,
        /// Result code reported by the service.
        reason: ReasonCode,
    },

    /// The session was torn down by the transport or the place layer.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The quote corpus could not be loaded.
    #[error("cannot load quote corpus {path}: {source}")]
    Corpus {
        /// Resolved corpus path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for presence probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
