//! Handling of frames clients send to the hub.

use carelink_core::protocol::{
    encode, parse_client_message, CallEnded, ClientMessage, ErrorData, ForceLeave, ServerMessage,
};

use super::registry::{HubFrame, SessionRegistry};

/// Decode and act on one text frame from session `sid`.
///
/// Malformed frames are logged and answered with an `error` frame; they
/// never end the session.
pub async fn handle_client_frame(sessions: &SessionRegistry, sid: &str, text: &str) {
    match parse_client_message(text) {
        Ok(ClientMessage::CallEnded(payload)) => {
            relay_call_ended(sessions, sid, &payload).await;
        }
        Err(e) => {
            tracing::warn!(sid = %sid, error = %e, "Ignoring malformed client frame");
            let reply = ServerMessage::Error(ErrorData {
                message: e.to_string(),
            });
            if let Ok(text) = encode(&reply) {
                sessions.send_to(sid, HubFrame::Text(text)).await;
            }
        }
    }
}

/// Send `force_leave` to every session of every participant, except the
/// session that reported the end of the call. Returns how many sessions
/// were notified.
pub async fn relay_call_ended(sessions: &SessionRegistry, sid: &str, payload: &CallEnded) -> usize {
    let signal = ServerMessage::ForceLeave(ForceLeave {
        appointment_id: payload.appointment_id.clone(),
        ended_by: payload.ended_by.clone(),
    });

    match sessions
        .send_message_to_users(&payload.participant_ids, &signal, Some(sid))
        .await
    {
        Ok(delivered) => {
            tracing::info!(
                sid = %sid,
                appointment_id = %payload.appointment_id,
                ended_by = %payload.ended_by,
                delivered,
                "Relayed call_ended as force_leave",
            );
            delivered
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode force_leave");
            0
        }
    }
}
