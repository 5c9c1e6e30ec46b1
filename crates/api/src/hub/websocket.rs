use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use super::dispatch::handle_client_frame;
use super::registry::{HubFrame, SessionTransport};
use super::ConnectParams;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to a WebSocket session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let user_id = params.user_id();
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Manage a single WebSocket session after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the session, which queues the `connect` handshake.
///   2. Spawns a sender task that forwards frames from the registry channel.
///   3. Dispatches inbound frames on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let sid = uuid::Uuid::new_v4().to_string();
    tracing::info!(sid = %sid, user_id = ?user_id, "WebSocket session opened");

    let mut rx = state
        .sessions
        .add(sid.clone(), user_id, SessionTransport::WebSocket)
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_sid = sid.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = frame == HubFrame::Close;
            let message = match frame {
                HubFrame::Text(text) => Message::Text(text.into()),
                HubFrame::Ping => Message::Ping(Bytes::new()),
                HubFrame::Close => Message::Close(None),
            };
            if sink.send(message).await.is_err() {
                tracing::debug!(sid = %sender_sid, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_frame(&state.sessions, &sid, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(sid = %sid, "Pong received");
            }
            Ok(_) => {
                tracing::debug!(sid = %sid, "Ignoring non-text frame");
            }
            Err(e) => {
                tracing::debug!(sid = %sid, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.sessions.remove(&sid).await;
    send_task.abort();
    tracing::info!(sid = %sid, "WebSocket session closed");
}
