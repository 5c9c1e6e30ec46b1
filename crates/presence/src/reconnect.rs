//! Capped exponential-backoff reconnection for the presence channel.
//!
//! When a session drops, or the very first connection attempt fails, the
//! driver calls [`reconnect_loop`] which keeps retrying with increasing
//! delays until a session opens, the attempt budget is spent, or the
//! [`CancellationToken`] is triggered by teardown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::Shared;
use crate::driver::{open_session, Session};
use crate::events::ChannelEvent;

/// Tunable parameters for the reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether dropped sessions are re-established at all.
    pub enabled: bool,
    /// Reconnection attempts allowed after a failure before giving up.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Time allowed for one attempt, from opening the transport until the
    /// handshake frame arrives.
    pub timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// How a reconnection loop ended.
pub(crate) enum ReconnectOutcome {
    Connected(Session),
    Exhausted,
    Cancelled,
}

/// Retry opening a session with exponential backoff.
///
/// Every attempt waits first, then tries each configured transport in
/// preference order. Publishes `reconnect_attempt`, `connect_error`,
/// `reconnect` and `reconnect_failed` events along the way. Cancellation
/// is honoured both while waiting and while an attempt is in flight, so no
/// attempt starts after teardown.
pub(crate) async fn reconnect_loop(shared: &Shared, cancel: &CancellationToken) -> ReconnectOutcome {
    let config = &shared.config.reconnect;
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        if config.max_attempts.is_some_and(|max| attempt >= max) {
            tracing::warn!(attempts = attempt, "Reconnection attempts exhausted");
            shared.publish(ChannelEvent::ReconnectFailed { attempts: attempt });
            return ReconnectOutcome::Exhausted;
        }

        attempt += 1;
        shared.mark_reconnecting(attempt);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to presence hub",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        shared.publish(ChannelEvent::ReconnectAttempt { attempt });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = open_session(&shared.connectors, config.timeout) => {
                match result {
                    Ok(session) => {
                        tracing::info!(attempt, sid = %session.sid, "Reconnected to presence hub");
                        shared.publish(ChannelEvent::Reconnect { attempts: attempt });
                        return ReconnectOutcome::Connected(session);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnect attempt {attempt} failed");
                        shared.publish(ChannelEvent::ConnectError {
                            attempt,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = ReconnectConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = ReconnectConfig::default();
        let d = next_delay(Duration::from_secs(4), &config);
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn custom_multiplier() {
        let config = ReconnectConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(2), &config);
        assert_eq!(d, Duration::from_secs(6));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = ReconnectConfig::default();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 5, 5, 5];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    #[test]
    fn default_policy_is_bounded() {
        let config = ReconnectConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.timeout, Duration::from_secs(20));
    }
}
