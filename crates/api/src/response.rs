//! Shared response envelope types for API handlers.
//!
//! REST responses under `/api/v1` use a `{ "data": ... }` envelope. The
//! long-polling session bodies are protocol frames and are not wrapped.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: counts }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
