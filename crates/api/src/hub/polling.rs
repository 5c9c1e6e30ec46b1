//! HTTP long-polling sessions, for clients that cannot hold a WebSocket.
//!
//! ```text
//! POST   /{namespace}/poll?userId=..   open a session      -> {"sid": ".."}
//! GET    /{namespace}/poll/{sid}       wait for frames     -> {"frames": [..]}
//! POST   /{namespace}/poll/{sid}       send one frame      -> 204
//! DELETE /{namespace}/poll/{sid}       close the session   -> 204
//! ```
//!
//! Unknown, closed and reaped sessions answer 404.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use carelink_core::protocol::{PollBatch, PollOpened};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use super::dispatch::handle_client_frame;
use super::registry::{HubFrame, SessionTransport};
use super::ConnectParams;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Outbound queue of one polling session.
pub struct PollQueue {
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<HubFrame>>,
    last_seen: Mutex<Instant>,
}

impl PollQueue {
    fn new(receiver: mpsc::UnboundedReceiver<HubFrame>) -> Self {
        Self {
            receiver: tokio::sync::Mutex::new(receiver),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Result of one long-poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Drained {
    /// Frames queued for the session, possibly none if the wait timed out.
    Frames(Vec<String>),
    /// The session was closed. Carries any frames queued before the close.
    Closed(Vec<String>),
}

/// Queues of all polling sessions, keyed by `sid`.
pub struct PollQueues {
    queues: RwLock<HashMap<String, Arc<PollQueue>>>,
}

impl PollQueues {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, sid: String, receiver: mpsc::UnboundedReceiver<HubFrame>) {
        self.queues
            .write()
            .await
            .insert(sid, Arc::new(PollQueue::new(receiver)));
    }

    pub async fn remove(&self, sid: &str) -> bool {
        self.queues.write().await.remove(sid).is_some()
    }

    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queues.read().await.is_empty()
    }

    /// Record client activity on a session. Returns `false` if unknown.
    pub async fn touch(&self, sid: &str) -> bool {
        match self.queues.read().await.get(sid) {
            Some(queue) => {
                queue.touch();
                true
            }
            None => false,
        }
    }

    /// Wait up to `timeout` for a first frame, then take everything else
    /// already queued. `None` if the session is unknown.
    ///
    /// Pings are skipped; polling clients are kept alive by their own
    /// requests.
    pub async fn drain(&self, sid: &str, timeout: Duration) -> Option<Drained> {
        let queue = self.queues.read().await.get(sid).cloned()?;
        queue.touch();

        let mut receiver = queue.receiver.lock().await;
        let mut frames = Vec::new();

        let first = match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => return Some(Drained::Closed(frames)),
            Err(_) => None,
        };

        let mut next = first;
        while let Some(frame) = next.take() {
            match frame {
                HubFrame::Text(text) => frames.push(text),
                HubFrame::Ping => {}
                HubFrame::Close => return Some(Drained::Closed(frames)),
            }
            next = receiver.try_recv().ok();
        }

        queue.touch();
        Some(Drained::Frames(frames))
    }

    /// Remove every session idle for longer than `ttl` and return their ids.
    pub async fn take_idle(&self, ttl: Duration) -> Vec<String> {
        let mut queues = self.queues.write().await;
        let idle: Vec<String> = queues
            .iter()
            .filter(|(_, queue)| queue.idle_for() > ttl)
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in &idle {
            queues.remove(sid);
        }
        idle
    }
}

impl Default for PollQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// POST /{namespace}/poll
pub async fn open_session(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Json<PollOpened> {
    let sid = uuid::Uuid::new_v4().to_string();
    let user_id = params.user_id();
    tracing::info!(sid = %sid, user_id = ?user_id, "Polling session opened");

    let receiver = state
        .sessions
        .add(sid.clone(), user_id, SessionTransport::Polling)
        .await;
    state.polls.insert(sid.clone(), receiver).await;

    Json(PollOpened { sid })
}

/// GET /{namespace}/poll/{sid}
pub async fn poll_frames(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> AppResult<Json<PollBatch>> {
    match state
        .polls
        .drain(&sid, state.config.poll_timeout())
        .await
    {
        Some(Drained::Frames(frames)) => {
            tracing::trace!(sid = %sid, count = frames.len(), "Long-poll answered");
            Ok(Json(PollBatch { frames }))
        }
        Some(Drained::Closed(frames)) => {
            state.polls.remove(&sid).await;
            state.sessions.remove(&sid).await;
            tracing::info!(sid = %sid, "Polling session closed by hub");
            if frames.is_empty() {
                Err(AppError::session_not_found(&sid))
            } else {
                Ok(Json(PollBatch { frames }))
            }
        }
        None => Err(AppError::session_not_found(&sid)),
    }
}

/// POST /{namespace}/poll/{sid}
pub async fn send_frame(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    body: String,
) -> AppResult<StatusCode> {
    if !state.polls.touch(&sid).await || !state.sessions.contains(&sid).await {
        return Err(AppError::session_not_found(&sid));
    }
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("Frame body must not be empty".into()));
    }

    handle_client_frame(&state.sessions, &sid, &body).await;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{namespace}/poll/{sid}
pub async fn close_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> AppResult<StatusCode> {
    let had_queue = state.polls.remove(&sid).await;
    let had_session = state.sessions.remove(&sid).await;
    if !had_queue && !had_session {
        return Err(AppError::session_not_found(&sid));
    }
    tracing::info!(sid = %sid, "Polling session closed by client");
    Ok(StatusCode::NO_CONTENT)
}
