//! WebSocket transport.
//!
//! [`WsConnector`] holds the endpoint for one hub namespace. Each call to
//! [`Connector::open`] performs a fresh handshake and splits the socket
//! into a text-frame sink and stream.
//!
//! With a read timeout set, the stream fails with
//! [`TransportError::Timeout`] when the hub sends nothing at all (hub pings
//! included) for that long, so a half-open socket is detected.

use std::time::Duration;

use futures::{future, stream, SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Connector, Transport, TransportError, TransportKind};

/// Connects to the hub over WebSocket.
pub struct WsConnector {
    url: Url,
    read_timeout: Option<Duration>,
}

impl WsConnector {
    /// * `url` - full endpoint, e.g. `ws://host:3000/presence?userId=u1`.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            read_timeout: None,
        }
    }

    /// Fail the inbound stream after `idle` without any frame from the hub.
    pub fn with_read_timeout(mut self, idle: Duration) -> Self {
        self.read_timeout = Some(idle);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&self) -> Result<Transport, TransportError> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            TransportError::Connect(format!("Failed to connect to {}: {e}", self.url))
        })?;

        tracing::debug!(url = %self.url, "WebSocket transport open");

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|frame: String| future::ready(Ok::<_, TransportError>(Message::Text(frame))));

        let read_timeout = self.read_timeout;
        let stream = stream::unfold(Some(stream), move |raw| async move {
            let mut raw = raw?;
            loop {
                let next = match read_timeout {
                    Some(idle) => match tokio::time::timeout(idle, raw.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!(?idle, "No frames from the hub, dropping WebSocket");
                            return Some((Err(TransportError::Timeout(idle)), None));
                        }
                    },
                    None => raw.next().await,
                };
                match next? {
                    Ok(Message::Text(text)) => return Some((Ok(text), Some(raw))),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Hub closed the WebSocket");
                    }
                    // Ping/Pong are answered by tungstenite and only reset
                    // the idle clock; the hub never sends binary frames.
                    Ok(_) => {}
                    Err(e) => {
                        return Some((Err(TransportError::Receive(e.to_string())), None));
                    }
                }
            }
        });

        Ok(Transport {
            kind: TransportKind::WebSocket,
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}
