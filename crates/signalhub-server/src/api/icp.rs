use axum::{extract::State, Extension, Json};
use signalhub_core::IcpConfig;
use signalhub_db::BucketStore;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

pub(super) async fn get_icp_config(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<IcpConfig>>, ApiError> {
    let icp = state
        .current_icp()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(icp, req_id.0)))
}

/// Replaces the stored ICP. Omitted fields take their defaults.
pub(super) async fn put_icp_config(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(icp): Json<IcpConfig>,
) -> Result<Json<ApiResponse<IcpConfig>>, ApiError> {
    if icp.target_country.trim().is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "targetCountry must not be empty",
        ));
    }
    state
        .store
        .save_icp_config(&icp)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(target_country = %icp.target_country, "icp configuration updated");
    Ok(Json(ApiResponse::new(icp, req_id.0)))
}
