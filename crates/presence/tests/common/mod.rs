//! Scripted in-memory transport for driving a `PresenceChannel` in tests.
//!
//! [`mock_hub`] returns a connector to hand to the channel builder and a
//! [`MockHub`] that controls it: how many attempts fail, and the hub side
//! of every session that opens.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use carelink_core::protocol::{encode, Handshake, ServerMessage};
use carelink_presence::{
    ChannelEvent, ConnectionState, Connector, PresenceChannel, PresenceConfig, ReconnectConfig,
    Transport, TransportError, TransportKind,
};
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

/// Fail every attempt from now on.
const FAIL_FOREVER: u32 = u32::MAX;

struct MockState {
    kind: TransportKind,
    attempts: AtomicU32,
    failures_left: AtomicU32,
    opened: AtomicU32,
    sessions: mpsc::UnboundedSender<MockSession>,
}

/// Connector half, given to the channel.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

/// Control half, kept by the test.
pub struct MockHub {
    state: Arc<MockState>,
    sessions: mpsc::UnboundedReceiver<MockSession>,
}

/// Hub side of one open session.
pub struct MockSession {
    pub sid: String,
    to_client: fmpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

pub fn mock_hub() -> (MockConnector, MockHub) {
    mock_hub_of_kind(TransportKind::WebSocket)
}

pub fn mock_hub_of_kind(kind: TransportKind) -> (MockConnector, MockHub) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(MockState {
        kind,
        attempts: AtomicU32::new(0),
        failures_left: AtomicU32::new(0),
        opened: AtomicU32::new(0),
        sessions: tx,
    });
    (
        MockConnector {
            state: Arc::clone(&state),
        },
        MockHub {
            state,
            sessions: rx,
        },
    )
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    fn kind(&self) -> TransportKind {
        self.state.kind
    }

    async fn open(&self) -> Result<Transport, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let left = self.state.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != FAIL_FOREVER {
                self.state.failures_left.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(TransportError::Connect("connection refused".into()));
        }

        let n = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let sid = format!("mock-{n}");

        let (to_client, client_stream) = fmpsc::unbounded();
        let (client_sink, from_client) = fmpsc::unbounded::<String>();

        let handshake = encode(&ServerMessage::Connect(Handshake { sid: sid.clone() }))
            .expect("handshake encodes");
        to_client
            .unbounded_send(Ok(handshake))
            .expect("client stream is alive");

        let _ = self.state.sessions.send(MockSession {
            sid,
            to_client,
            from_client,
        });

        Ok(Transport {
            kind: self.state.kind,
            sink: Box::pin(client_sink.sink_map_err(|e| TransportError::Send(e.to_string()))),
            stream: client_stream.boxed(),
        })
    }
}

impl MockHub {
    /// Total `open` calls so far.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: u32) {
        self.state.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.state.failures_left.store(FAIL_FOREVER, Ordering::SeqCst);
    }

    pub fn succeed(&self) {
        self.state.failures_left.store(0, Ordering::SeqCst);
    }

    /// Wait for the next session the channel opens.
    pub async fn accept(&mut self) -> MockSession {
        tokio::time::timeout(Duration::from_secs(60), self.sessions.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("connector dropped")
    }

    /// Session opened without waiting, if any.
    pub fn try_accept(&mut self) -> Option<MockSession> {
        self.sessions.try_recv().ok()
    }
}

impl MockSession {
    pub fn push(&self, message: &ServerMessage) {
        self.push_raw(&encode(message).expect("message encodes"));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(text.to_string()));
    }

    pub fn push_error(&self, error: TransportError) {
        let _ = self.to_client.unbounded_send(Err(error));
    }

    /// Simulate the hub closing the connection.
    pub fn drop_connection(self) {
        drop(self);
    }

    /// Next frame the client wrote, or `None` once the client closed its
    /// side.
    pub async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(60), self.from_client.next())
            .await
            .expect("timed out waiting for a client frame")
    }

    /// A frame already written by the client, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.from_client.try_next().ok().flatten()
    }

    /// Whether the client has closed its sending side.
    pub async fn client_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(60), self.from_client.next()).await,
            Ok(None)
        )
    }
}

/// Config with a short, bounded policy suitable for paused-clock tests.
pub fn test_config(max_attempts: Option<u32>) -> PresenceConfig {
    PresenceConfig {
        reconnect: ReconnectConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            timeout: Duration::from_secs(2),
            ..Default::default()
        },
        ..PresenceConfig::new("http://hub.invalid")
    }
}

pub fn channel_with(connector: MockConnector, max_attempts: Option<u32>) -> PresenceChannel {
    PresenceChannel::builder(test_config(max_attempts))
        .connector(connector)
        .build()
        .expect("channel builds")
}

/// Wait until the channel reaches `state`.
pub async fn wait_for_state(channel: &PresenceChannel, state: ConnectionState) {
    let mut rx = channel.watch_state();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("state sender dropped");
}

/// Receive events until one matches `pred`, returning it.
pub async fn next_event_matching<F>(
    rx: &mut broadcast::Receiver<ChannelEvent>,
    mut pred: F,
) -> ChannelEvent
where
    F: FnMut(&ChannelEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain events already published.
pub fn drain_events(rx: &mut broadcast::Receiver<ChannelEvent>) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks run until they are idle.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
