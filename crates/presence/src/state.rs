//! Connection state as observed by consumers.

use serde::Serialize;

use crate::transport::TransportKind;

/// Lifecycle of the channel's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// First connection attempt in flight.
    Connecting,
    /// Handshake completed; events flow.
    Open,
    /// The connection dropped or never opened; backoff in progress.
    Reconnecting,
    /// Torn down, never started, or the reconnection policy gave up.
    Closed,
}

/// Point-in-time view of the connection, published through a
/// `tokio::sync::watch` channel on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    /// Hub-assigned session id while `Open`.
    pub sid: Option<String>,
    /// Transport carrying the open session.
    pub transport: Option<TransportKind>,
    /// Reconnection attempts made since the last successful open.
    pub attempts: u32,
}

impl ConnectionSnapshot {
    pub fn closed() -> Self {
        Self {
            state: ConnectionState::Closed,
            sid: None,
            transport: None,
            attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self::closed()
    }
}
