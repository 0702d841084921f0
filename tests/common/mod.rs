#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for presence-probe integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`LoopbackService`] that plays
//! the presence service in memory, and helpers for building server JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use presence_probe::latency::FIELD_DELIMITER;
use presence_probe::protocol::{
    Attribute, AttributeId, ClientMessage, MemberInfo, Position, ServerMessage,
};
use presence_probe::{ProbeError, ReasonCode, Transport};
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

pub const LOBBY_URL: &str = "vp://loopback/lobby";

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, ProbeError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, ProbeError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ProbeError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ProbeError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted: stay open until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── LoopbackService ─────────────────────────────────────────────────

/// Every request the loopback received, stamped with (paused) tokio time.
pub type Journal = Arc<StdMutex<Vec<(Instant, ClientMessage)>>>;

/// An in-memory presence service.
///
/// Answers sign-on and navigation, echoes whispers addressed to the probe
/// back to it, and closes the link after a sign-off. Knobs below inject the
/// conditions the probe has to cope with.
pub struct LoopbackService {
    member: MemberInfo,
    welcome: String,
    outbox: VecDeque<Option<String>>,
    journal: Journal,
    /// Replicas below this number answer `RoomIsFull`.
    pub full_below_replica: u32,
    /// Seconds subtracted from the timestamp of every echoed probe.
    pub lag_secs: i64,
    /// Never send the greeting when the link comes up.
    pub withhold_welcome: bool,
    /// Never answer the sign-on.
    pub ignore_sign_on: bool,
    /// Answer every navigation with this wire reason, listed or not.
    pub fail_navigation_with: Option<String>,
    /// After N echoed whispers, tear the session down with this wire
    /// reason and close the link.
    pub disconnect_after: Option<(usize, String)>,
    /// Whisper sent to the probe by another member once it is signed on.
    pub stranger_whisper: Option<(MemberInfo, String)>,
    echoed: usize,
    greeted: bool,
}

impl LoopbackService {
    pub fn new(name: &str) -> (Self, Journal) {
        let journal: Journal = Arc::new(StdMutex::new(Vec::new()));
        let welcome = ServerMessage::Welcome {
            attributes: vec![
                Attribute::new(AttributeId::CommunityName, "Loopback"),
                Attribute::new(AttributeId::LobbyUrl, LOBBY_URL),
            ],
        };
        let service = Self {
            member: MemberInfo {
                id: Uuid::from_u128(0x5eed),
                name: name.into(),
            },
            outbox: VecDeque::new(),
            welcome: to_json(&welcome),
            journal: Arc::clone(&journal),
            full_below_replica: 0,
            lag_secs: 0,
            withhold_welcome: false,
            ignore_sign_on: false,
            fail_navigation_with: None,
            disconnect_after: None,
            stranger_whisper: None,
            echoed: 0,
            greeted: false,
        };
        (service, journal)
    }

    pub fn member(&self) -> &MemberInfo {
        &self.member
    }

    fn reply(&mut self, msg: ServerMessage) {
        self.outbox.push_back(Some(to_json(&msg)));
    }

    fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::SignOn { .. } if !self.ignore_sign_on => {
                self.reply(ServerMessage::SignedOn {
                    member: self.member.clone(),
                });
                if let Some((from, text)) = self.stranger_whisper.take() {
                    self.reply(ServerMessage::Whispered { from, text });
                }
            }
            ClientMessage::Navigate { position, .. } if self.fail_navigation_with.is_some() => {
                let reason = self.fail_navigation_with.clone().unwrap_or_default();
                self.outbox.push_back(Some(raw_message(
                    "Navigated",
                    json!({"requested": position, "reason": reason}),
                )));
            }
            ClientMessage::Navigate {
                position, replica, ..
            } => {
                let reason = if replica < self.full_below_replica {
                    ReasonCode::RoomIsFull
                } else {
                    ReasonCode::Ok
                };
                self.reply(ServerMessage::Navigated {
                    requested: position,
                    reason,
                    title: "Loopback Lobby".into(),
                });
            }
            ClientMessage::Whisper { to, text } if to == self.member.id => {
                self.reply(ServerMessage::Whispered {
                    from: self.member.clone(),
                    text: skew_timestamp(&text, self.lag_secs),
                });
                self.echoed += 1;
                if let Some((after, reason)) = &self.disconnect_after {
                    if self.echoed >= *after {
                        let teardown = raw_message("Disconnecting", json!({"reason": reason}));
                        self.outbox.push_back(Some(teardown));
                        self.outbox.push_back(None);
                    }
                }
            }
            ClientMessage::SignOff => {
                self.reply(ServerMessage::Disconnecting {
                    reason: ReasonCode::Ok,
                    duration_secs: None,
                });
                self.outbox.push_back(None);
            }
            ClientMessage::Ping => self.reply(ServerMessage::Pong),
            _ => {}
        }
    }
}

#[async_trait]
impl Transport for LoopbackService {
    async fn send(&mut self, message: String) -> Result<(), ProbeError> {
        let msg: ClientMessage = serde_json::from_str(&message)?;
        self.journal
            .lock()
            .unwrap()
            .push((Instant::now(), msg.clone()));
        self.handle(msg);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ProbeError>> {
        if !std::mem::replace(&mut self.greeted, true) && !self.withhold_welcome {
            return Some(Ok(self.welcome.clone()));
        }
        match self.outbox.pop_front() {
            Some(Some(json)) => Some(Ok(json)),
            Some(None) => None,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// A server message assembled by hand, so reasons outside [`ReasonCode`]
/// can be sent.
fn raw_message(kind: &str, data: serde_json::Value) -> String {
    json!({"type": kind, "data": data}).to_string()
}

/// Move the leading timestamp of a probe `secs` into the past.
fn skew_timestamp(text: &str, secs: i64) -> String {
    if secs == 0 {
        return text.to_string();
    }
    match text.split_once(FIELD_DELIMITER) {
        Some((stamp, rest)) => match stamp.parse::<i64>() {
            Ok(stamp) => format!("{}{FIELD_DELIMITER}{rest}", stamp - secs),
            Err(_) => text.to_string(),
        },
        None => text.to_string(),
    }
}

/// Journal entries matching `pred`.
pub fn journal_where(
    journal: &Journal,
    pred: impl Fn(&ClientMessage) -> bool,
) -> Vec<(Instant, ClientMessage)> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, msg)| pred(msg))
        .cloned()
        .collect()
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn to_json(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("server message serialization")
}

pub fn probe_member() -> MemberInfo {
    MemberInfo {
        id: Uuid::from_u128(42),
        name: "probe1".into(),
    }
}

pub fn welcome_json() -> String {
    to_json(&ServerMessage::Welcome {
        attributes: vec![Attribute::new(AttributeId::LobbyUrl, LOBBY_URL)],
    })
}

pub fn signed_on_json() -> String {
    to_json(&ServerMessage::SignedOn {
        member: probe_member(),
    })
}

pub fn navigated_json(reason: ReasonCode) -> String {
    to_json(&ServerMessage::Navigated {
        requested: Some(Position::new(500, 500)),
        reason,
        title: String::new(),
    })
}

pub fn whispered_json(from: MemberInfo, text: &str) -> String {
    to_json(&ServerMessage::Whispered {
        from,
        text: text.into(),
    })
}

pub fn disconnecting_json(reason: ReasonCode) -> String {
    to_json(&ServerMessage::Disconnecting {
        reason,
        duration_secs: Some(60),
    })
}

pub fn error_json(message: &str, reason: Option<ReasonCode>) -> String {
    to_json(&ServerMessage::Error {
        message: message.into(),
        reason,
    })
}

pub fn pong_json() -> String {
    to_json(&ServerMessage::Pong)
}
