//! Presence channel wire protocol.
//!
//! Every frame, on every transport, is a JSON text of the shape
//! `{"event": "<name>", "data": {...}}`. Payload fields are camelCase so
//! browser clients can consume them unchanged. This module deserializes
//! frames into the strongly-typed [`ServerMessage`] and [`ClientMessage`]
//! enums and encodes them back.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{AppointmentId, UserId};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Handshake sent by the hub as the first frame of every session. Also the
/// lifecycle name published to consumers when a connection opens.
pub const EVENT_CONNECT: &str = "connect";

/// A connection attempt failed.
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// An open connection was lost.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// A reconnection attempt succeeded.
pub const EVENT_RECONNECT: &str = "reconnect";

/// A reconnection attempt is about to start.
pub const EVENT_RECONNECT_ATTEMPT: &str = "reconnect_attempt";

/// The reconnection policy gave up.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect_failed";

/// The hub reported an error.
pub const EVENT_ERROR: &str = "error";

/// A user's block status changed.
pub const EVENT_USER_STATUS_UPDATED: &str = "user_status_updated";

/// The other participant ended a call; the receiver must leave it.
pub const EVENT_FORCE_LEAVE: &str = "force_leave";

/// Outbound: this client ended a call.
pub const EVENT_CALL_ENDED: &str = "call_ended";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// All frames the hub sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Session handshake carrying the hub-assigned identifier.
    #[serde(rename = "connect")]
    Connect(Handshake),

    /// An administrator blocked or unblocked a user.
    #[serde(rename = "user_status_updated")]
    UserStatusUpdated(UserStatusUpdated),

    /// A call this client takes part in was ended by someone else.
    #[serde(rename = "force_leave")]
    ForceLeave(ForceLeave),

    /// Hub-side error report.
    #[serde(rename = "error")]
    Error(ErrorData),
}

/// All frames a client sends to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// The sender ended a call.
    #[serde(rename = "call_ended")]
    CallEnded(CallEnded),
}

/// Payload for `connect` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub sid: String,
}

/// Payload for `user_status_updated` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdated {
    pub user_id: UserId,
    pub is_blocked: bool,
}

/// Payload for `force_leave` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceLeave {
    pub appointment_id: AppointmentId,
    /// User who ended the call.
    pub ended_by: UserId,
}

/// Payload for `error` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// Payload for `call_ended` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    /// User who ended the call.
    pub ended_by: UserId,
    pub appointment_id: AppointmentId,
    /// Every party of the call. The hub notifies all of them except the
    /// sending session.
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
}

impl CallEnded {
    pub fn new(
        ended_by: impl Into<UserId>,
        appointment_id: impl Into<AppointmentId>,
        participant_ids: Vec<UserId>,
    ) -> Self {
        Self {
            ended_by: ended_by.into(),
            appointment_id: appointment_id.into(),
            participant_ids,
        }
    }

    /// Reject payloads with blank identifiers.
    pub fn validate(&self) -> Result<(), CoreError> {
        require_non_blank("endedBy", &self.ended_by)?;
        require_non_blank("appointmentId", &self.appointment_id)?;
        for id in &self.participant_ids {
            require_non_blank("participantIds[]", id)?;
        }
        Ok(())
    }
}

impl ServerMessage {
    /// The wire name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connect(_) => EVENT_CONNECT,
            ServerMessage::UserStatusUpdated(_) => EVENT_USER_STATUS_UPDATED,
            ServerMessage::ForceLeave(_) => EVENT_FORCE_LEAVE,
            ServerMessage::Error(_) => EVENT_ERROR,
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        match self {
            ServerMessage::Connect(h) => require_non_blank("sid", &h.sid),
            ServerMessage::UserStatusUpdated(s) => require_non_blank("userId", &s.user_id),
            ServerMessage::ForceLeave(f) => {
                require_non_blank("appointmentId", &f.appointment_id)
            }
            ServerMessage::Error(_) => Ok(()),
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Long-polling bodies
// ---------------------------------------------------------------------------

/// Response to `POST /{namespace}/poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOpened {
    pub sid: String,
}

/// Response to `GET /{namespace}/poll/{sid}`: the text frames queued for
/// the session, oldest first. Empty when the long-poll timed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBatch {
    pub frames: Vec<String>,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Errors from decoding or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON, unknown event name, or missing/mistyped fields.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed JSON whose payload fails validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Parse a hub-to-client text frame.
///
/// Returns `Err` for malformed JSON, unknown event names and payloads with
/// missing or blank fields. Callers should log and continue.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let msg: ServerMessage = serde_json::from_str(text)?;
    msg.validate()?;
    Ok(msg)
}

/// Parse a client-to-hub text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let msg: ClientMessage = serde_json::from_str(text)?;
    match &msg {
        ClientMessage::CallEnded(payload) => payload.validate()?,
    }
    Ok(msg)
}

/// Encode any message as a text frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}
