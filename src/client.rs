//! Async client for the presence service.
//!
//! [`PresenceClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<PresenceEvent>`]) returned
//! from [`PresenceClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://chat.example:7777").await?;
//! let (client, mut events) = PresenceClient::start(transport, PresenceConfig::new());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PresenceEvent::Connected { .. } => client.sign_on("probe1", "secret")?,
//!         PresenceEvent::PlaceConnected { member } => { /* … */ }
//!         PresenceEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::error::{ProbeError, Result};
use crate::event::PresenceEvent;
use crate::presence::Presence;
use crate::protocol::{ClientMessage, MemberId, MemberInfo, Position, ServerMessage};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on a single transport write.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`PresenceClient`] connection.
///
/// ```
/// use presence_probe::client::PresenceConfig;
/// use std::time::Duration;
///
/// let config = PresenceConfig::new()
///     .with_app_version("Virtual Places Chat Version 3.0")
///     .with_send_timeout(Duration::from_secs(5));
/// assert_eq!(config.send_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Client version string advertised at sign-on.
    /// Defaults to `presence-probe/<crate version>`.
    pub app_version: Option<String>,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) rather than blocking the transport loop. `Disconnected` is
    /// always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the transport loop is given to close the link on
    /// [`PresenceClient::shutdown`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Bound on a single transport write. A write that does not complete in
    /// time ends the session with a failure reason.
    ///
    /// Defaults to **10 seconds**.
    pub send_timeout: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            app_version: Some(format!("presence-probe/{}", env!("CARGO_PKG_VERSION"))),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the version string advertised at sign-on.
    #[must_use]
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the bound on a single transport write.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    signed_on: AtomicBool,
    member: Mutex<Option<MemberInfo>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            signed_on: AtomicBool::new(false),
            member: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the presence service.
///
/// Created via [`PresenceClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver. All request
/// methods queue a [`ClientMessage`] and return immediately; their `Result`
/// is the immediate status code of the request.
pub struct PresenceClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    app_version: Option<String>,
}

impl PresenceClient {
    /// Start the transport loop and return a handle plus event receiver.
    ///
    /// Nothing is sent until the caller reacts to
    /// [`PresenceEvent::Connected`]; the receiver yields events until the
    /// transport closes or the client shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: PresenceConfig,
    ) -> (Self, mpsc::Receiver<PresenceEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<PresenceEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
            config.send_timeout,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            app_version: config.app_version,
        };

        (client, event_rx)
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Sign on to the place layer.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn sign_on(&self, name: &str, password: &str) -> Result<()> {
        self.send(ClientMessage::SignOn {
            name: name.to_string(),
            password: password.to_string(),
            app_version: self.app_version.clone(),
        })
    }

    /// Navigate to a destination at `position` in replica `replica`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn navigate(&self, destination: &str, position: Position, replica: u32) -> Result<()> {
        self.send(ClientMessage::Navigate {
            destination: destination.to_string(),
            position: Some(position),
            replica,
        })
    }

    /// Send a private message.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn whisper(&self, to: MemberId, text: &str) -> Result<()> {
        self.send(ClientMessage::Whisper {
            to,
            text: text.to_string(),
        })
    }

    /// Chat to the whole room.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn chat(&self, text: &str) -> Result<()> {
        self.send(ClientMessage::Chat {
            text: text.to_string(),
        })
    }

    /// Move within the current room.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn move_to(&self, position: Position) -> Result<()> {
        self.send(ClientMessage::Move { position })
    }

    /// Replace the avatar image.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn set_face(&self, image: Vec<u8>) -> Result<()> {
        self.send(ClientMessage::SetFace { image })
    }

    /// Sign off voluntarily. The service answers with a zero-reason
    /// `Disconnecting`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn sign_off(&self) -> Result<()> {
        self.send(ClientMessage::SignOff)
    }

    /// Send a heartbeat ping.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NotConnected`] if the transport has closed.
    pub fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping)
    }

    /// Flush queued requests, close the transport and stop the background task.
    ///
    /// The loop gets `shutdown_timeout` to finish; after that it is aborted.
    pub async fn shutdown(&mut self) {
        debug!("presence client shutting down");
        if let Some(signal) = self.shutdown_tx.take() {
            // The loop may already be gone; nothing to signal then.
            let _ = signal.send(());
        }

        if let Some(mut task) = self.task.take() {
            let finished = tokio::time::timeout(self.shutdown_timeout, &mut task).await;
            match finished {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("transport loop ended abnormally: {join_err}"),
                Err(_elapsed) => {
                    warn!(
                        timeout = ?self.shutdown_timeout,
                        "transport loop still running, aborting"
                    );
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` once the service has confirmed sign-on.
    pub fn is_signed_on(&self) -> bool {
        self.state.signed_on.load(Ordering::Acquire)
    }

    /// Returns the identity assigned at sign-on.
    pub async fn current_member(&self) -> Option<MemberInfo> {
        self.state.member.lock().await.clone()
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(ProbeError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| ProbeError::NotConnected)
    }
}

impl Presence for PresenceClient {
    fn sign_on(&self, name: &str, password: &str) -> Result<()> {
        PresenceClient::sign_on(self, name, password)
    }

    fn navigate(&self, destination: &str, position: Position, replica: u32) -> Result<()> {
        PresenceClient::navigate(self, destination, position, replica)
    }

    fn whisper(&self, to: MemberId, text: &str) -> Result<()> {
        PresenceClient::whisper(self, to, text)
    }

    fn chat(&self, text: &str) -> Result<()> {
        PresenceClient::chat(self, text)
    }

    fn move_to(&self, position: Position) -> Result<()> {
        PresenceClient::move_to(self, position)
    }

    fn set_face(&self, image: Vec<u8>) -> Result<()> {
        PresenceClient::set_face(self, image)
    }
}

impl std::fmt::Debug for PresenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceClient")
            .field("connected", &self.is_connected())
            .field("signed_on", &self.is_signed_on())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop multiplexing outgoing requests and incoming messages.
///
/// Exits when the command channel closes, shutdown is signalled, the service
/// closes the link, or a transport error (including a send timeout) occurs.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<PresenceEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    send_timeout: Duration,
) {
    debug!("transport loop started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        if let Err(e) = write_message(&mut transport, &msg, send_timeout).await {
                            error!("transport send error: {e}");
                            emit_disconnected(
                                &event_tx,
                                &state,
                                Some(format!("transport send error: {e}")),
                            ).await;
                            break;
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                // Requests queued before shutdown (e.g. SignOff) still go out.
                while let Ok(msg) = cmd_rx.try_recv() {
                    if write_message(&mut transport, &msg, send_timeout).await.is_err() {
                        break;
                    }
                }
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                update_state(&state, &server_msg).await;
                                emit_event(&event_tx, PresenceEvent::from(server_msg)).await;
                            }
                            Err(e) => {
                                warn!("failed to deserialize server message: {e}, raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Serialize and write one message, bounded by `send_timeout`.
///
/// Serialization failures are logged and swallowed; they are programming
/// bugs and must not end the session.
async fn write_message(
    transport: &mut impl Transport,
    msg: &ClientMessage,
    send_timeout: Duration,
) -> Result<()> {
    debug!("sending client message: {:?}", std::mem::discriminant(msg));
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize ClientMessage: {e}");
            return Ok(());
        }
    };
    match tokio::time::timeout(send_timeout, transport.send(json)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout),
    }
}

/// Update shared [`ClientState`] based on a received [`ServerMessage`].
async fn update_state(state: &ClientState, msg: &ServerMessage) {
    match msg {
        ServerMessage::SignedOn { member } => {
            state.signed_on.store(true, Ordering::Release);
            *state.member.lock().await = Some(member.clone());
            debug!("state: signed on as {} ({})", member.name, member.id);
        }
        ServerMessage::Disconnecting { reason, .. } => {
            state.signed_on.store(false, Ordering::Release);
            debug!("state: signed off ({})", reason.code());
        }
        _ => {}
    }
}

/// Forward an event without ever blocking the loop; a full channel drops it.
async fn emit_event(event_tx: &mpsc::Sender<PresenceEvent>, event: PresenceEvent) {
    if let Err(e) = event_tx.try_send(event) {
        match e {
            mpsc::error::TrySendError::Full(dropped) => {
                warn!(event = ?dropped, "event channel full, event dropped");
            }
            mpsc::error::TrySendError::Closed(_) => debug!("event receiver gone"),
        }
    }
}

/// Mark the link down and deliver the final
/// [`Disconnected`](PresenceEvent::Disconnected). Waits for channel space so
/// this event is never dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<PresenceEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    state.signed_on.store(false, Ordering::Release);
    if event_tx
        .send(PresenceEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event receiver gone");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transport whose writes never complete.
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ProbeError> {
            std::future::pending().await
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ProbeError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ProbeError> {
            Ok(())
        }
    }

    #[test]
    fn config_clamps_capacity() {
        let config = PresenceConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn default_app_version_names_the_crate() {
        let config = PresenceConfig::default();
        assert!(config
            .app_version
            .as_deref()
            .unwrap()
            .starts_with("presence-probe/"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_times_out_and_disconnects() {
        let config = PresenceConfig::new().with_send_timeout(Duration::from_secs(3));
        let (mut client, mut events) = PresenceClient::start(StalledTransport, config);

        client.chat("hello?").unwrap();

        let event = events.recv().await.unwrap();
        match event {
            PresenceEvent::Disconnected { reason: Some(reason) } => {
                assert!(reason.contains("timed out"), "got {reason}");
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(!client.is_connected());
        assert!(matches!(client.chat("again"), Err(ProbeError::NotConnected)));

        client.shutdown().await;
    }
}
