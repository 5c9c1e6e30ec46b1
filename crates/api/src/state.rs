use std::sync::Arc;

use crate::config::ServerConfig;
use crate::hub::{PollQueues, SessionRegistry};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Every open session, WebSocket and polling alike.
    pub sessions: Arc<SessionRegistry>,
    /// Outbound queues of polling sessions, drained by long-poll requests.
    pub polls: Arc<PollQueues>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            polls: Arc::new(PollQueues::new()),
        }
    }
}
