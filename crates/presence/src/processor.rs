//! Frame processing loop for one open session.
//!
//! Reads inbound text frames, hands each to the [`InboundRouter`], and
//! writes queued outbound frames, until the transport drops or the
//! channel is torn down. Everything runs on the driver task, so inbound
//! handlers never overlap.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::Shared;
use crate::driver::Session;
use crate::router::InboundRouter;

/// Time allowed for a graceful close on teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session stopped.
pub(crate) enum SessionEnd {
    /// Teardown; the driver must exit.
    Cancelled,
    /// The transport failed or the hub closed it.
    Dropped(String),
}

pub(crate) async fn process_frames(
    shared: &Shared,
    session: Session,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let Session { sid, transport } = session;
    let mut sink = transport.sink;
    let mut stream = transport.stream;
    let router = InboundRouter::new(shared, &sid);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                    tracing::debug!(sid = %sid, "Transport close timed out");
                }
                return SessionEnd::Cancelled;
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => router.route_text(&text),
                Some(Err(e)) => {
                    tracing::warn!(sid = %sid, error = %e, "Presence transport error");
                    return SessionEnd::Dropped(e.to_string());
                }
                None => return SessionEnd::Dropped("transport closed".into()),
            },
            Some(frame) = outbound.recv() => {
                tracing::trace!(sid = %sid, "Sending outbound frame");
                if let Err(e) = sink.send(frame).await {
                    // Best-effort: no retry, nothing surfaced to the caller.
                    tracing::warn!(sid = %sid, error = %e, "Outbound frame dropped");
                }
            }
        }
    }
}
