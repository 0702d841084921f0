//! Integration-style tests for `PresenceClient`.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! messages and verify state transitions, request encoding, and event
//! delivery.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use presence_probe::protocol::{AttributeId, ClientMessage, MemberInfo, Position};
use presence_probe::{
    Presence, PresenceClient, PresenceConfig, PresenceEvent, ProbeError, ReasonCode,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use common::{
    disconnecting_json, error_json, navigated_json, pong_json, probe_member, signed_on_json,
    welcome_json, whispered_json, MockTransport, LOBBY_URL,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

#[allow(clippy::type_complexity)]
fn start_client(
    incoming: Vec<Option<Result<String, ProbeError>>>,
) -> (
    PresenceClient,
    mpsc::Receiver<PresenceEvent>,
    Arc<StdMutex<Vec<String>>>,
    Arc<AtomicBool>,
) {
    let (transport, sent, closed) = MockTransport::new(incoming);
    let config = PresenceConfig::new().with_app_version("probe-tests/1");
    let (client, events) = PresenceClient::start(transport, config);
    (client, events, sent, closed)
}

fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|json| serde_json::from_str(json).expect("client sent invalid JSON"))
        .collect()
}

/// Wait until the transport loop has written `count` messages.
async fn wait_for_sent(sent: &Arc<StdMutex<Vec<String>>>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sent.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("client did not send in time");
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn welcome_then_signed_on() {
    let (mut client, mut events, _sent, _closed) =
        start_client(vec![Some(Ok(welcome_json())), Some(Ok(signed_on_json()))]);

    let ev = events.recv().await.expect("event");
    let PresenceEvent::Connected { attributes } = ev else {
        panic!("first event should be Connected, got {ev:?}");
    };
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].id, AttributeId::LobbyUrl);
    assert_eq!(attributes[0].value, LOBBY_URL);

    let ev = events.recv().await.expect("event");
    assert!(
        matches!(&ev, PresenceEvent::PlaceConnected { member } if *member == probe_member()),
        "got {ev:?}"
    );
    assert!(client.is_signed_on());
    assert_eq!(client.current_member().await, Some(probe_member()));

    client.shutdown().await;
}

#[tokio::test]
async fn nothing_is_sent_until_asked() {
    let (mut client, mut events, sent, _closed) = start_client(vec![Some(Ok(welcome_json()))]);
    let _ = events.recv().await;
    tokio::task::yield_now().await;
    assert!(sent.lock().unwrap().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn zero_reason_disconnecting_clears_sign_on() {
    let (mut client, mut events, _sent, _closed) = start_client(vec![
        Some(Ok(signed_on_json())),
        Some(Ok(disconnecting_json(ReasonCode::Ok))),
    ]);

    let _ = events.recv().await;
    let ev = events.recv().await.expect("event");
    assert!(matches!(
        ev,
        PresenceEvent::Disconnecting {
            reason: ReasonCode::Ok
        }
    ));
    assert!(!client.is_signed_on());
    client.shutdown().await;
}

#[tokio::test]
async fn server_close_is_a_clean_disconnect() {
    let (client, mut events, _sent, _closed) = start_client(vec![None]);

    let ev = events.recv().await.expect("event");
    assert!(
        matches!(ev, PresenceEvent::Disconnected { reason: None }),
        "got {ev:?}"
    );
    assert!(!client.is_connected());
    assert!(matches!(
        client.chat("anyone?"),
        Err(ProbeError::NotConnected)
    ));
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn receive_error_disconnects_with_reason() {
    let (_client, mut events, _sent, _closed) = start_client(vec![Some(Err(
        ProbeError::TransportReceive("connection reset".into()),
    ))]);

    let ev = events.recv().await.expect("event");
    let PresenceEvent::Disconnected {
        reason: Some(reason),
    } = ev
    else {
        panic!("expected Disconnected with reason, got {ev:?}");
    };
    assert!(reason.contains("connection reset"), "got {reason}");
}

#[tokio::test]
async fn malformed_messages_are_skipped() {
    let (mut client, mut events, _sent, _closed) = start_client(vec![
        Some(Ok("{not json".into())),
        Some(Ok(r#"{"type":"Teleport","data":{}}"#.into())),
        Some(Ok(pong_json())),
    ]);

    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, PresenceEvent::Pong), "got {ev:?}");
    client.shutdown().await;
}

#[tokio::test]
async fn service_errors_surface_as_events() {
    let (mut client, mut events, _sent, _closed) = start_client(vec![Some(Ok(error_json(
        "slow down",
        Some(ReasonCode::ServiceUnavailable),
    )))]);

    let ev = events.recv().await.expect("event");
    let PresenceEvent::Error { message, reason } = ev else {
        panic!("expected Error, got {ev:?}");
    };
    assert_eq!(message, "slow down");
    assert_eq!(reason, Some(ReasonCode::ServiceUnavailable));
    client.shutdown().await;
}

#[tokio::test]
async fn navigation_results_carry_the_reason() {
    let (mut client, mut events, _sent, _closed) =
        start_client(vec![Some(Ok(navigated_json(ReasonCode::RoomIsFull)))]);

    let ev = events.recv().await.expect("event");
    assert!(
        matches!(
            ev,
            PresenceEvent::Navigated {
                reason: ReasonCode::RoomIsFull,
                ..
            }
        ),
        "got {ev:?}"
    );
    client.shutdown().await;
}

#[tokio::test]
async fn whispers_become_events() {
    let stranger = MemberInfo {
        id: Uuid::from_u128(99),
        name: "alice".into(),
    };
    let (mut client, mut events, _sent, _closed) =
        start_client(vec![Some(Ok(whispered_json(stranger.clone(), "psst")))]);

    let ev = events.recv().await.expect("event");
    let PresenceEvent::Whispered { from, text } = ev else {
        panic!("expected Whispered, got {ev:?}");
    };
    assert_eq!(from, stranger);
    assert_eq!(text, "psst");
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sign_on_advertises_the_app_version() {
    let (mut client, _events, sent, _closed) = start_client(vec![]);

    client.sign_on("probe1", "secret").unwrap();
    wait_for_sent(&sent, 1).await;

    let msgs = sent_messages(&sent);
    let ClientMessage::SignOn {
        name,
        password,
        app_version,
    } = &msgs[0]
    else {
        panic!("expected SignOn, got {:?}", msgs[0]);
    };
    assert_eq!(name, "probe1");
    assert_eq!(password, "secret");
    assert_eq!(app_version.as_deref(), Some("probe-tests/1"));

    client.shutdown().await;
}

#[tokio::test]
async fn requests_go_out_in_order() {
    let (mut client, _events, sent, _closed) = start_client(vec![]);
    let me = probe_member().id;

    client
        .navigate(LOBBY_URL, Position::new(500, 500), 1)
        .unwrap();
    client.set_face(vec![0x47, 0x49, 0x46]).unwrap();
    client.whisper(me, "1700000000\tnow\tabc").unwrap();
    client.move_to(Position::new(3, 4)).unwrap();
    client.chat("Yow!").unwrap();
    client.ping().unwrap();
    wait_for_sent(&sent, 6).await;

    let msgs = sent_messages(&sent);
    assert!(matches!(
        &msgs[0],
        ClientMessage::Navigate { destination, position: Some(p), replica: 1 }
            if destination == LOBBY_URL && *p == Position::new(500, 500)
    ));
    assert!(matches!(&msgs[1], ClientMessage::SetFace { image } if image == b"GIF"));
    assert!(matches!(&msgs[2], ClientMessage::Whisper { to, .. } if *to == me));
    assert!(matches!(
        &msgs[3],
        ClientMessage::Move { position } if *position == Position::new(3, 4)
    ));
    assert!(matches!(&msgs[4], ClientMessage::Chat { text } if text == "Yow!"));
    assert!(matches!(&msgs[5], ClientMessage::Ping));

    client.shutdown().await;
}

#[tokio::test]
async fn presence_trait_routes_through_the_client() {
    fn speak<P: Presence>(presence: &P) {
        presence.chat("via trait").unwrap();
    }

    let (mut client, _events, sent, _closed) = start_client(vec![]);
    speak(&client);
    speak(&&client);
    wait_for_sent(&sent, 2).await;
    assert_eq!(sent_messages(&sent).len(), 2);
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_flushes_sign_off_and_closes() {
    let (mut client, mut events, sent, closed) = start_client(vec![]);

    client.sign_off().unwrap();
    client.shutdown().await;

    assert!(closed.load(Ordering::Relaxed));
    assert!(sent_messages(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::SignOff)));

    let ev = events.recv().await.expect("final event");
    assert!(matches!(ev, PresenceEvent::Disconnected { reason: Some(_) }));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn shutdown_twice_is_harmless() {
    let (mut client, _events, _sent, _closed) = start_client(vec![]);
    client.shutdown().await;
    client.shutdown().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn debug_output_shows_state() {
    let (mut client, _events, _sent, _closed) = start_client(vec![]);
    let debug = format!("{client:?}");
    assert!(debug.contains("PresenceClient"));
    assert!(debug.contains("connected: true"));
    client.shutdown().await;
}
