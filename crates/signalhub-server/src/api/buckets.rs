use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use signalhub_core::{BucketWithSignals, CandidateProfile, IcpConfig};
use signalhub_db::BucketStore;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct ProcessRequest {
    icp_config: Option<IcpConfig>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidatesQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TriggerResponse {
    bucket_id: i64,
    count: usize,
    candidates: Vec<CandidateProfile>,
}

pub(super) async fn list_buckets(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<BucketWithSignals>>>, ApiError> {
    let buckets = state
        .store
        .list_buckets_with_signals()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(buckets, req_id.0)))
}

/// Classifies pending signals with the request's ICP, or the current one when
/// the body omits it.
pub(super) async fn process_buckets(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<ProcessRequest>>,
) -> Result<Json<ApiResponse<Vec<BucketWithSignals>>>, ApiError> {
    let icp = match body.and_then(|Json(b)| b.icp_config) {
        Some(icp) => icp,
        None => state
            .current_icp()
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    };
    let buckets = state
        .engine
        .process_signals(&icp)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(buckets, req_id.0)))
}

pub(super) async fn trigger_workflow(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(bucket_id): Path<i64>,
) -> Result<Json<ApiResponse<TriggerResponse>>, ApiError> {
    let icp = state
        .current_icp()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let candidates = state
        .workflow
        .trigger(bucket_id, &icp)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(
        TriggerResponse {
            bucket_id,
            count: candidates.len(),
            candidates,
        },
        req_id.0,
    )))
}

pub(super) async fn list_candidates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(bucket_id): Path<i64>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<ApiResponse<Vec<CandidateProfile>>>, ApiError> {
    let candidates = state
        .workflow
        .list_candidates(bucket_id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(candidates, req_id.0)))
}
