use axum::{extract::State, Extension, Json};
use signalhub_pipeline::QueueStats;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

pub(super) async fn queue_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<QueueStats>>, ApiError> {
    let stats = state
        .queue()
        .stats()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(stats, req_id.0)))
}
