//! Transports the presence channel can ride on.
//!
//! A [`Connector`] opens one [`Transport`]: a sink of outbound text frames
//! plus a stream of inbound text frames. The stream ending means the hub
//! closed the session. The channel tries its connectors in preference
//! order on every connection attempt.

mod polling;
mod websocket;

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::Sink;
use serde::Serialize;

use crate::config::{ConfigError, PresenceConfig};

pub use polling::PollingConnector;
pub use websocket::WsConnector;

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a transport.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// The kinds of transport the hub serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent streaming connection.
    WebSocket,
    /// HTTP long-polling fallback.
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Polling => f.write_str("polling"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "polling" | "long-polling" => Ok(TransportKind::Polling),
            other => Err(format!("unknown transport {other:?}")),
        }
    }
}

/// An open, bidirectional frame pipe to the hub.
pub struct Transport {
    pub kind: TransportKind,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports of one kind.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Open a new transport. Does not wait for the handshake frame.
    async fn open(&self) -> Result<Transport, TransportError>;
}

/// Errors raised by transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("Connection error: {0}")]
    Connect(String),

    /// An outbound frame could not be written.
    #[error("Send error: {0}")]
    Send(String),

    /// The inbound side failed.
    #[error("Receive error: {0}")]
    Receive(String),

    /// The attempt did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The hub did not open the session with a valid `connect` frame.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// The hub closed the transport.
    #[error("Transport closed")]
    Closed,
}

/// Build one connector per configured transport, in preference order.
pub fn default_connectors(config: &PresenceConfig) -> Result<Vec<Arc<dyn Connector>>, ConfigError> {
    config
        .transports
        .iter()
        .map(|kind| {
            let connector: Arc<dyn Connector> = match kind {
                TransportKind::WebSocket => {
                    let connector = WsConnector::new(config.websocket_url()?);
                    match config.read_timeout {
                        Some(idle) => Arc::new(connector.with_read_timeout(idle)),
                        None => Arc::new(connector),
                    }
                }
                TransportKind::Polling => Arc::new(PollingConnector::new(config.polling_url()?)),
            };
            Ok(connector)
        })
        .collect()
}
