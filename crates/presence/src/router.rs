//! Inbound message router.
//!
//! Decodes each text frame into a [`ServerMessage`] and dispatches it
//! through one exhaustive `match`. Malformed frames are logged and
//! skipped; nothing here can fail the session.

use std::panic::{catch_unwind, AssertUnwindSafe};

use carelink_core::protocol::{parse_server_message, ForceLeave, ServerMessage};

use crate::channel::Shared;
use crate::events::ChannelEvent;

pub(crate) struct InboundRouter<'a> {
    shared: &'a Shared,
    sid: &'a str,
}

impl<'a> InboundRouter<'a> {
    pub(crate) fn new(shared: &'a Shared, sid: &'a str) -> Self {
        Self { shared, sid }
    }

    pub(crate) fn route_text(&self, text: &str) {
        match parse_server_message(text) {
            Ok(msg) => self.route(msg),
            Err(e) => {
                tracing::warn!(
                    sid = %self.sid,
                    error = %e,
                    raw_message = %text,
                    "Ignoring malformed presence frame",
                );
            }
        }
    }

    pub(crate) fn route(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connect(handshake) => {
                tracing::debug!(
                    sid = %self.sid,
                    repeated_sid = %handshake.sid,
                    "Ignoring repeated handshake",
                );
            }
            ServerMessage::UserStatusUpdated(update) => {
                let previous = self
                    .shared
                    .block_status
                    .apply(&update.user_id, update.is_blocked);
                tracing::debug!(
                    sid = %self.sid,
                    user_id = %update.user_id,
                    is_blocked = update.is_blocked,
                    ?previous,
                    "User status updated",
                );
                self.shared.publish(ChannelEvent::UserStatusUpdated(update));
            }
            ServerMessage::ForceLeave(signal) => {
                tracing::info!(
                    sid = %self.sid,
                    appointment_id = %signal.appointment_id,
                    ended_by = %signal.ended_by,
                    "Force-leave received",
                );
                self.run_force_leave_handler(&signal);
                self.shared.publish(ChannelEvent::ForceLeave(signal));
            }
            ServerMessage::Error(data) => {
                tracing::warn!(sid = %self.sid, message = %data.message, "Hub reported an error");
                self.shared.publish(ChannelEvent::Error {
                    message: data.message,
                });
            }
        }
    }

    fn run_force_leave_handler(&self, signal: &ForceLeave) {
        let Some(handler) = &self.shared.force_leave else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(signal))).is_err() {
            tracing::error!(
                sid = %self.sid,
                appointment_id = %signal.appointment_id,
                "Force-leave handler panicked",
            );
        }
    }
}
