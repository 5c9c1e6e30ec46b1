pub mod health;

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers;
use crate::hub::{self, polling};
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /users/{user_id}/status        PUT    block or unblock, broadcast to sessions
/// /presence/sessions             GET    open session counts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{user_id}/status",
            put(handlers::users::update_status),
        )
        .route(
            "/presence/sessions",
            get(handlers::presence::list_sessions),
        )
}

/// Build the client attachment routes under `/{namespace}`.
///
/// ```text
/// /{namespace}                   GET    WebSocket upgrade
/// /{namespace}/poll              POST   open a polling session
/// /{namespace}/poll/{sid}        GET    long-poll for frames
///                                POST   send a frame
///                                DELETE close the session
/// ```
pub fn presence_routes(namespace: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("/{namespace}"), get(hub::ws_handler))
        .route(
            &format!("/{namespace}/poll"),
            post(polling::open_session),
        )
        .route(
            &format!("/{namespace}/poll/{{sid}}"),
            get(polling::poll_frames)
                .post(polling::send_frame)
                .delete(polling::close_session),
        )
}
