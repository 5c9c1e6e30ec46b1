//! Tests for `SessionRegistry` and inbound dispatch.
//!
//! These exercise the registry directly, without HTTP upgrades or
//! long-polls. They verify add/remove semantics, the handshake ordering,
//! targeted delivery, the `call_ended` relay and shutdown behaviour.

use std::time::Duration;

use assert_matches::assert_matches;
use carelink_api::hub::dispatch::{handle_client_frame, relay_call_ended};
use carelink_api::hub::{
    reap_idle_polling_sessions, HubFrame, PollQueues, SessionCounts, SessionRegistry,
    SessionTransport,
};
use carelink_core::protocol::{
    encode, parse_server_message, CallEnded, ClientMessage, ForceLeave, Handshake, ServerMessage,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Pop the next frame and decode it as a server message.
fn next_message(rx: &mut UnboundedReceiver<HubFrame>) -> ServerMessage {
    match rx.try_recv().expect("a frame should be queued") {
        HubFrame::Text(text) => parse_server_message(&text).expect("frame should decode"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Consume the handshake every session starts with.
fn skip_handshake(rx: &mut UnboundedReceiver<HubFrame>) {
    assert_matches!(next_message(rx), ServerMessage::Connect(_));
}

async fn add_ws(
    registry: &SessionRegistry,
    sid: &str,
    user: Option<&str>,
) -> UnboundedReceiver<HubFrame> {
    let mut rx = registry
        .add(sid.to_string(), user.map(str::to_string), SessionTransport::WebSocket)
        .await;
    skip_handshake(&mut rx);
    rx
}

// ---------------------------------------------------------------------------
// Test: new registry starts empty
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_registry_has_zero_sessions() {
    let registry = SessionRegistry::new();

    assert_eq!(registry.session_count().await, 0);
    assert_eq!(registry.counts().await, SessionCounts::default());
}

// ---------------------------------------------------------------------------
// Test: the handshake is the first frame of every session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_queues_handshake_first() {
    let registry = SessionRegistry::new();

    let mut rx = registry
        .add("sid-1".to_string(), None, SessionTransport::Polling)
        .await;

    assert_eq!(
        next_message(&mut rx),
        ServerMessage::Connect(Handshake {
            sid: "sid-1".into()
        })
    );
    assert!(rx.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: add/remove bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_sessions() {
    let registry = SessionRegistry::new();

    let _rx1 = add_ws(&registry, "sid-1", Some("u1")).await;
    let _rx2 = registry
        .add("sid-2".to_string(), None, SessionTransport::Polling)
        .await;

    assert_eq!(
        registry.counts().await,
        SessionCounts {
            total: 2,
            websocket: 1,
            polling: 1,
        }
    );
    assert!(registry.contains("sid-1").await);
    assert_eq!(registry.user_of("sid-1").await.as_deref(), Some("u1"));
    assert_eq!(registry.user_of("sid-2").await, None);

    assert!(registry.remove("sid-1").await);
    assert!(!registry.remove("sid-1").await);
    assert!(!registry.contains("sid-1").await);
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test]
async fn connected_at_is_recorded_until_removal() {
    let registry = SessionRegistry::new();
    let before = chrono::Utc::now();
    let _rx = add_ws(&registry, "sid-1", Some("u1")).await;

    let connected_at = registry
        .connected_at("sid-1")
        .await
        .expect("session is registered");
    assert!(connected_at >= before);
    assert!(connected_at <= chrono::Utc::now());

    assert!(registry.remove("sid-1").await);
    assert_eq!(registry.connected_at("sid-1").await, None);
}

#[tokio::test]
async fn remove_closes_the_session_channel() {
    let registry = SessionRegistry::new();
    let mut rx = add_ws(&registry, "sid-1", None).await;

    registry.remove("sid-1").await;

    assert!(rx.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: broadcast reaches every session and skips closed channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_sends_to_all_sessions() {
    let registry = SessionRegistry::new();

    let mut rx1 = add_ws(&registry, "sid-1", None).await;
    let mut rx2 = add_ws(&registry, "sid-2", Some("u2")).await;
    let dropped = add_ws(&registry, "sid-3", None).await;
    drop(dropped);

    let delivered = registry.broadcast(HubFrame::Text("hello".into())).await;

    assert_eq!(delivered, 2);
    assert_eq!(rx1.try_recv().unwrap(), HubFrame::Text("hello".into()));
    assert_eq!(rx2.try_recv().unwrap(), HubFrame::Text("hello".into()));
}

// ---------------------------------------------------------------------------
// Test: targeted delivery by user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_message_to_users_skips_excluded_session() {
    let registry = SessionRegistry::new();

    let mut doc_tab_a = add_ws(&registry, "a", Some("doc-1")).await;
    let mut doc_tab_b = add_ws(&registry, "b", Some("doc-1")).await;
    let mut patient = add_ws(&registry, "c", Some("pat-2")).await;
    let mut bystander = add_ws(&registry, "d", Some("other")).await;
    let mut anonymous = add_ws(&registry, "e", None).await;

    let message = ServerMessage::ForceLeave(ForceLeave {
        appointment_id: "apt-1".into(),
        ended_by: "doc-1".into(),
    });
    let delivered = registry
        .send_message_to_users(&["doc-1".into(), "pat-2".into()], &message, Some("a"))
        .await
        .unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(next_message(&mut doc_tab_b), message);
    assert_eq!(next_message(&mut patient), message);
    assert!(doc_tab_a.try_recv().is_err());
    assert!(bystander.try_recv().is_err());
    assert!(anonymous.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: heartbeat pings reach WebSocket sessions only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_targets_websocket_sessions() {
    let registry = SessionRegistry::new();

    let mut ws = add_ws(&registry, "ws", None).await;
    let mut polling = registry
        .add("poll".to_string(), None, SessionTransport::Polling)
        .await;
    skip_handshake(&mut polling);

    assert_eq!(registry.ping_all().await, 1);
    assert_eq!(ws.try_recv().unwrap(), HubFrame::Ping);
    assert!(polling.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let registry = SessionRegistry::new();

    let mut rx1 = add_ws(&registry, "sid-1", None).await;
    let mut rx2 = add_ws(&registry, "sid-2", None).await;

    registry.shutdown_all().await;

    assert_eq!(registry.session_count().await, 0);
    assert_eq!(rx1.recv().await, Some(HubFrame::Close));
    assert_eq!(rx2.recv().await, Some(HubFrame::Close));
    assert!(
        rx1.recv().await.is_none(),
        "Channel should be closed after shutdown"
    );
}

// ---------------------------------------------------------------------------
// Test: call_ended relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn call_ended_is_relayed_as_force_leave() {
    let registry = SessionRegistry::new();

    let mut sender = add_ws(&registry, "doc", Some("doc-1")).await;
    let mut patient = add_ws(&registry, "pat", Some("pat-2")).await;

    let payload = CallEnded::new("doc-1", "apt-9", vec!["doc-1".into(), "pat-2".into()]);
    let frame = encode(&ClientMessage::CallEnded(payload)).unwrap();
    handle_client_frame(&registry, "doc", &frame).await;

    assert_eq!(
        next_message(&mut patient),
        ServerMessage::ForceLeave(ForceLeave {
            appointment_id: "apt-9".into(),
            ended_by: "doc-1".into(),
        })
    );
    assert!(sender.try_recv().is_err());
}

#[tokio::test]
async fn relay_without_participants_delivers_nothing() {
    let registry = SessionRegistry::new();
    let _rx = add_ws(&registry, "doc", Some("doc-1")).await;

    let delivered = relay_call_ended(&registry, "doc", &CallEnded::new("doc-1", "apt-1", vec![])).await;

    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn malformed_client_frame_gets_error_reply() {
    let registry = SessionRegistry::new();
    let mut sender = add_ws(&registry, "s", Some("u1")).await;
    let mut other = add_ws(&registry, "t", Some("u2")).await;

    handle_client_frame(&registry, "s", "{not json").await;
    handle_client_frame(
        &registry,
        "s",
        r#"{"event":"call_ended","data":{"endedBy":"u1","appointmentId":""}}"#,
    )
    .await;

    assert_matches!(next_message(&mut sender), ServerMessage::Error(_));
    assert_matches!(next_message(&mut sender), ServerMessage::Error(_));
    assert!(other.try_recv().is_err());
    assert!(registry.contains("s").await);
}

// ---------------------------------------------------------------------------
// Test: idle polling sessions are reaped
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn idle_polling_sessions_are_reaped() {
    let registry = SessionRegistry::new();
    let polls = PollQueues::new();

    let rx = registry
        .add("poll".to_string(), Some("u1".into()), SessionTransport::Polling)
        .await;
    polls.insert("poll".to_string(), rx).await;
    let _ws = add_ws(&registry, "ws", Some("u2")).await;

    let ttl = Duration::from_secs(60);
    assert_eq!(reap_idle_polling_sessions(&registry, &polls, ttl).await, 0);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(reap_idle_polling_sessions(&registry, &polls, ttl).await, 1);

    assert!(!registry.contains("poll").await);
    assert!(registry.contains("ws").await);
    assert!(polls.is_empty().await);
}
