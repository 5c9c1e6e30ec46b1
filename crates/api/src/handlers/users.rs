use axum::extract::{Path, State};
use axum::Json;
use carelink_core::error::CoreError;
use carelink_core::protocol::{encode, ServerMessage, UserStatusUpdated};
use carelink_core::types::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::hub::HubFrame;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `PUT /users/{user_id}/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserStatus {
    pub is_blocked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusChange {
    pub user_id: UserId,
    pub is_blocked: bool,
    /// Sessions the update was queued for.
    pub delivered: usize,
}

/// PUT /api/v1/users/{user_id}/status
///
/// Broadcasts `user_status_updated` to every connected session.
pub async fn update_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserStatus>,
) -> AppResult<Json<DataResponse<UserStatusChange>>> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(CoreError::Validation("User id must not be empty".into()).into());
    }

    let frame = encode(&ServerMessage::UserStatusUpdated(UserStatusUpdated {
        user_id: user_id.to_string(),
        is_blocked: body.is_blocked,
    }))
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    let delivered = state.sessions.broadcast(HubFrame::Text(frame)).await;
    tracing::info!(
        user_id = %user_id,
        is_blocked = body.is_blocked,
        delivered,
        "Broadcast user status",
    );

    Ok(Json(DataResponse {
        data: UserStatusChange {
            user_id: user_id.to_string(),
            is_blocked: body.is_blocked,
            delivered,
        },
    }))
}
