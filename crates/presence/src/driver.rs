//! The per-channel driver task: connect -> process -> reconnect.

use std::sync::Arc;
use std::time::Duration;

use carelink_core::protocol::{parse_server_message, ServerMessage};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::Shared;
use crate::events::ChannelEvent;
use crate::processor::{process_frames, SessionEnd};
use crate::reconnect::{reconnect_loop, ReconnectOutcome};
use crate::transport::{Connector, Transport, TransportError};

/// An open transport whose handshake has completed.
pub(crate) struct Session {
    pub(crate) sid: String,
    pub(crate) transport: Transport,
}

/// Try each connector in preference order until one opens and completes
/// the handshake within `timeout`.
pub(crate) async fn open_session(
    connectors: &[Arc<dyn Connector>],
    timeout: Duration,
) -> Result<Session, TransportError> {
    let mut last_error = TransportError::Connect("no transports configured".into());

    for connector in connectors {
        let kind = connector.kind();
        match tokio::time::timeout(timeout, handshake(connector.as_ref())).await {
            Ok(Ok(session)) => {
                tracing::debug!(transport = %kind, sid = %session.sid, "Presence session opened");
                return Ok(session);
            }
            Ok(Err(e)) => {
                tracing::warn!(transport = %kind, error = %e, "Transport failed");
                last_error = e;
            }
            Err(_) => {
                tracing::warn!(
                    transport = %kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Transport timed out",
                );
                last_error = TransportError::Timeout(timeout);
            }
        }
    }

    Err(last_error)
}

/// Open a transport and wait for the hub's `connect` frame.
async fn handshake(connector: &dyn Connector) -> Result<Session, TransportError> {
    let mut transport = connector.open().await?;

    match transport.stream.next().await {
        Some(Ok(text)) => match parse_server_message(&text) {
            Ok(ServerMessage::Connect(handshake)) => Ok(Session {
                sid: handshake.sid,
                transport,
            }),
            Ok(other) => Err(TransportError::Handshake(format!(
                "expected connect, got {}",
                other.event_name()
            ))),
            Err(e) => Err(TransportError::Handshake(e.to_string())),
        },
        Some(Err(e)) => Err(e),
        None => Err(TransportError::Closed),
    }
}

/// Core connection loop.
///
/// Runs until the cancellation token is triggered, reconnection is
/// disabled and the session drops, or the reconnection policy gives up.
pub(crate) async fn run_connection_loop(
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let reconnect = shared.config.reconnect.clone();
    let mut session_lost = false;

    loop {
        let session = if session_lost {
            match reconnect_loop(&shared, &cancel).await {
                ReconnectOutcome::Connected(session) => session,
                ReconnectOutcome::Cancelled => return,
                ReconnectOutcome::Exhausted => {
                    shared.mark_closed();
                    return;
                }
            }
        } else {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = open_session(&shared.connectors, reconnect.timeout) => result,
            };
            match result {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(error = %e, "Connection failed");
                    shared.publish(ChannelEvent::ConnectError {
                        attempt: 0,
                        error: e.to_string(),
                    });
                    if !reconnect.enabled {
                        shared.mark_closed();
                        return;
                    }
                    session_lost = true;
                    continue;
                }
            }
        };

        // Frames queued against an earlier session are stale.
        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded outbound frames from a previous session");
        }

        let kind = session.transport.kind;
        tracing::info!(sid = %session.sid, transport = %kind, "Connected to presence hub");
        shared.mark_open(&session.sid, kind);
        shared.publish(ChannelEvent::Connect {
            sid: session.sid.clone(),
            transport: kind,
        });

        match process_frames(&shared, session, &mut outbound, &cancel).await {
            SessionEnd::Cancelled => return,
            SessionEnd::Dropped(reason) => {
                tracing::info!(reason = %reason, "Presence connection lost");
                shared.mark_reconnecting(0);
                shared.publish(ChannelEvent::Disconnect { reason });
                if !reconnect.enabled {
                    shared.mark_closed();
                    return;
                }
                session_lost = true;
            }
        }
    }
}
