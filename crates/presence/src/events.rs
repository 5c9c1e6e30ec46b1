//! Events published by the presence channel.
//!
//! Lifecycle events mirror the transport callbacks (`connect`,
//! `disconnect`, `reconnect_attempt`, ...); domain events carry the decoded
//! hub payloads. Call [`PresenceChannel::subscribe`](crate::PresenceChannel::subscribe)
//! to receive them.

use carelink_core::protocol::{
    ForceLeave, UserStatusUpdated, EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT,
    EVENT_ERROR, EVENT_FORCE_LEAVE, EVENT_RECONNECT, EVENT_RECONNECT_ATTEMPT,
    EVENT_RECONNECT_FAILED, EVENT_USER_STATUS_UPDATED,
};
use serde::Serialize;

use crate::transport::TransportKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A session opened and the handshake completed.
    Connect { sid: String, transport: TransportKind },

    /// A connection attempt failed. `attempt` is 0 for the initial
    /// connection and counts up during reconnection.
    ConnectError { attempt: u32, error: String },

    /// An open session was lost.
    Disconnect { reason: String },

    /// A reconnection attempt succeeded after `attempts` tries.
    Reconnect { attempts: u32 },

    /// Reconnection attempt number `attempt` is starting.
    ReconnectAttempt { attempt: u32 },

    /// The policy gave up; no further attempts will be made.
    ReconnectFailed { attempts: u32 },

    /// The hub reported an error.
    Error { message: String },

    /// A user's block status changed. Already applied to the block-status
    /// map when observed.
    UserStatusUpdated(UserStatusUpdated),

    /// The other participant ended a call.
    ForceLeave(ForceLeave),
}

impl ChannelEvent {
    /// The event name as used on the wire and in the browser client.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Connect { .. } => EVENT_CONNECT,
            ChannelEvent::ConnectError { .. } => EVENT_CONNECT_ERROR,
            ChannelEvent::Disconnect { .. } => EVENT_DISCONNECT,
            ChannelEvent::Reconnect { .. } => EVENT_RECONNECT,
            ChannelEvent::ReconnectAttempt { .. } => EVENT_RECONNECT_ATTEMPT,
            ChannelEvent::ReconnectFailed { .. } => EVENT_RECONNECT_FAILED,
            ChannelEvent::Error { .. } => EVENT_ERROR,
            ChannelEvent::UserStatusUpdated(_) => EVENT_USER_STATUS_UPDATED,
            ChannelEvent::ForceLeave(_) => EVENT_FORCE_LEAVE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serialized_tags() {
        let events = [
            ChannelEvent::Connect {
                sid: "s".into(),
                transport: TransportKind::WebSocket,
            },
            ChannelEvent::ConnectError {
                attempt: 1,
                error: "refused".into(),
            },
            ChannelEvent::Disconnect {
                reason: "closed".into(),
            },
            ChannelEvent::Reconnect { attempts: 2 },
            ChannelEvent::ReconnectAttempt { attempt: 2 },
            ChannelEvent::ReconnectFailed { attempts: 5 },
            ChannelEvent::Error {
                message: "oops".into(),
            },
            ChannelEvent::UserStatusUpdated(UserStatusUpdated {
                user_id: "u1".into(),
                is_blocked: true,
            }),
            ChannelEvent::ForceLeave(ForceLeave {
                appointment_id: "a1".into(),
                ended_by: "d1".into(),
            }),
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.name());
        }
    }
}
