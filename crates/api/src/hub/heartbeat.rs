use std::sync::Arc;
use std::time::Duration;

use super::polling::PollQueues;
use super::registry::SessionRegistry;

/// Spawn a background task that pings every WebSocket session and reaps
/// idle polling sessions once per `interval`.
///
/// The task runs until aborted through the returned handle.
pub fn start_heartbeat(
    sessions: Arc<SessionRegistry>,
    polls: Arc<PollQueues>,
    interval: Duration,
    poll_ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);

        loop {
            interval.tick().await;
            let pinged = sessions.ping_all().await;
            tracing::debug!(pinged, "Presence heartbeat ping");
            reap_idle_polling_sessions(&sessions, &polls, poll_ttl).await;
        }
    })
}

/// Drop polling sessions whose client has not polled or sent within `ttl`.
/// Returns how many were removed.
pub async fn reap_idle_polling_sessions(
    sessions: &SessionRegistry,
    polls: &PollQueues,
    ttl: Duration,
) -> usize {
    let idle = polls.take_idle(ttl).await;
    for sid in &idle {
        sessions.remove(sid).await;
        tracing::info!(sid = %sid, "Reaped idle polling session");
    }
    idle.len()
}
