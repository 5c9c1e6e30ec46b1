//! Presence hub: session registry, WebSocket and long-polling attachment,
//! inbound dispatch and the heartbeat task.

pub mod dispatch;
mod heartbeat;
pub mod polling;
pub mod registry;
mod websocket;

use serde::Deserialize;

pub use heartbeat::{reap_idle_polling_sessions, start_heartbeat};
pub use polling::PollQueues;
pub use registry::{HubFrame, SessionCounts, SessionRegistry, SessionTransport};
pub use websocket::ws_handler;

/// Query parameters accepted when a client attaches.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl ConnectParams {
    /// The identifying user, with blank values treated as anonymous.
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}
