use std::collections::HashMap;

use carelink_core::protocol::{encode, Handshake, ProtocolError, ServerMessage};
use carelink_core::types::{Timestamp, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// One outbound item for a session, independent of its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubFrame {
    /// An encoded protocol frame.
    Text(String),
    /// Keep-alive probe. Only meaningful for WebSocket sessions.
    Ping,
    /// The hub is closing the session.
    Close,
}

/// How a session is attached to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTransport {
    WebSocket,
    Polling,
}

/// Channel sender half for pushing frames to a session.
pub type HubSender = mpsc::UnboundedSender<HubFrame>;

/// Metadata for a single session.
pub struct HubSession {
    /// User the client identified as when connecting, if any.
    pub user_id: Option<UserId>,
    pub transport: SessionTransport,
    /// Channel sender for outbound frames to this session.
    pub sender: HubSender,
    pub connected_at: Timestamp,
}

/// Session totals reported by `GET /api/v1/presence/sessions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub total: usize,
    pub websocket: usize,
    pub polling: usize,
}

/// All open sessions, keyed by `sid`.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared across
/// the application.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, HubSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session and queue its `connect` handshake.
    ///
    /// The handshake is queued before the session becomes visible to
    /// broadcasts, so it is always the first frame the client receives.
    /// Returns the receiver half of the session's frame channel.
    pub async fn add(
        &self,
        sid: String,
        user_id: Option<UserId>,
        transport: SessionTransport,
    ) -> mpsc::UnboundedReceiver<HubFrame> {
        let (tx, rx) = mpsc::unbounded_channel();

        match encode(&ServerMessage::Connect(Handshake { sid: sid.clone() })) {
            Ok(handshake) => {
                let _ = tx.send(HubFrame::Text(handshake));
            }
            Err(e) => tracing::error!(sid = %sid, error = %e, "Failed to encode handshake"),
        }

        let session = HubSession {
            user_id,
            transport,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.sessions.write().await.insert(sid, session);
        rx
    }

    /// Remove a session. Returns whether it existed.
    ///
    /// Dropping the sender closes the session's channel, which ends its
    /// sender task or pending long-poll.
    pub async fn remove(&self, sid: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(sid) else {
            return false;
        };
        let connected_for = chrono::Utc::now() - session.connected_at;
        tracing::debug!(
            sid = %sid,
            user_id = ?session.user_id,
            transport = ?session.transport,
            connected_secs = connected_for.num_seconds(),
            "Session removed"
        );
        true
    }

    /// When a session was registered.
    pub async fn connected_at(&self, sid: &str) -> Option<Timestamp> {
        self.sessions
            .read()
            .await
            .get(sid)
            .map(|session| session.connected_at)
    }

    pub async fn contains(&self, sid: &str) -> bool {
        self.sessions.read().await.contains_key(sid)
    }

    /// The user a session identified as.
    pub async fn user_of(&self, sid: &str) -> Option<UserId> {
        self.sessions
            .read()
            .await
            .get(sid)
            .and_then(|session| session.user_id.clone())
    }

    /// Queue a frame for one session. Returns `false` if the session is
    /// unknown or its channel is closed.
    pub async fn send_to(&self, sid: &str, frame: HubFrame) -> bool {
        self.sessions
            .read()
            .await
            .get(sid)
            .is_some_and(|session| session.sender.send(frame).is_ok())
    }

    /// Queue a frame for every session.
    ///
    /// Sessions whose channels are closed are skipped (they are cleaned up
    /// by their own receive loop or the idle reaper). Returns the number
    /// of sessions the frame was queued for.
    pub async fn broadcast(&self, frame: HubFrame) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|session| session.sender.send(frame.clone()).is_ok())
            .count()
    }

    /// Encode `message` once and queue it for every session of the given
    /// users, skipping `except_sid`.
    pub async fn send_message_to_users(
        &self,
        user_ids: &[UserId],
        message: &ServerMessage,
        except_sid: Option<&str>,
    ) -> Result<usize, ProtocolError> {
        let text = encode(message)?;
        let sessions = self.sessions.read().await;

        let delivered = sessions
            .iter()
            .filter(|(sid, _)| Some(sid.as_str()) != except_sid)
            .filter(|(_, session)| {
                session
                    .user_id
                    .as_ref()
                    .is_some_and(|user| user_ids.contains(user))
            })
            .filter(|(_, session)| session.sender.send(HubFrame::Text(text.clone())).is_ok())
            .count();
        Ok(delivered)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn counts(&self) -> SessionCounts {
        let sessions = self.sessions.read().await;
        let websocket = sessions
            .values()
            .filter(|session| session.transport == SessionTransport::WebSocket)
            .count();
        SessionCounts {
            total: sessions.len(),
            websocket,
            polling: sessions.len() - websocket,
        }
    }

    /// Send a Close frame to every session, then clear the map.
    ///
    /// Used during graceful shutdown so clients learn the hub is going away
    /// before connections are cut.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for session in sessions.values() {
            let _ = session.sender.send(HubFrame::Close);
        }
        sessions.clear();
        tracing::info!(count, "Closed all presence sessions");
    }

    /// Send a Ping frame to every WebSocket session.
    pub async fn ping_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|session| session.transport == SessionTransport::WebSocket)
            .filter(|session| session.sender.send(HubFrame::Ping).is_ok())
            .count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
