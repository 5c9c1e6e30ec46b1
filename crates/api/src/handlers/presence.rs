use axum::extract::State;
use axum::Json;

use crate::hub::SessionCounts;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/presence/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<DataResponse<SessionCounts>> {
    Json(DataResponse {
        data: state.sessions.counts().await,
    })
}
