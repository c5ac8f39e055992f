use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalhub_core::{ConflictStrategy, IntegrationStatus, PartnerKind, SyncLog};
use signalhub_pipeline::{BidirectionalReport, IntegrationSyncStatus, SyncReport};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum SyncDirection {
    Pull,
    Push,
    #[default]
    Bidirectional,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct SyncRequest {
    direction: SyncDirection,
    partner: Option<String>,
    signal_ids: Option<Vec<i64>>,
    limit: Option<i64>,
    resolve_conflicts: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusQuery {
    partner: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum SyncOutcome {
    OneWay(SyncReport),
    Bidirectional(BidirectionalReport),
}

#[derive(Debug, Serialize)]
pub(super) struct SyncStatusResponse {
    integrations: Vec<IntegrationItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IntegrationItem {
    id: i64,
    partner: PartnerKind,
    status: IntegrationStatus,
    last_sync_at: Option<DateTime<Utc>>,
    job_posting_count: i64,
    recent_syncs: Vec<SyncLog>,
}

impl From<IntegrationSyncStatus> for IntegrationItem {
    fn from(status: IntegrationSyncStatus) -> Self {
        Self {
            id: status.integration.id,
            partner: status.integration.partner,
            status: status.integration.status,
            last_sync_at: status.integration.last_sync_at,
            job_posting_count: status.job_posting_count,
            recent_syncs: status.recent_logs,
        }
    }
}

fn parse_partner(request_id: &str, raw: Option<&str>) -> Result<Option<PartnerKind>, ApiError> {
    raw.map(str::parse::<PartnerKind>)
        .transpose()
        .map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))
}

pub(super) async fn trigger_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<ApiResponse<SyncOutcome>>, ApiError> {
    let partner = parse_partner(&req_id.0, body.partner.as_deref())?;
    let strategy = body
        .resolve_conflicts
        .as_deref()
        .map(str::parse::<ConflictStrategy>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?
        .unwrap_or_default();

    let result = match body.direction {
        SyncDirection::Pull => {
            let limit = body.limit.and_then(|l| usize::try_from(l).ok());
            state
                .sync
                .sync_from_partners(partner, limit)
                .await
                .map(SyncOutcome::OneWay)
        }
        SyncDirection::Push => state
            .sync
            .sync_to_partners(partner, body.signal_ids.as_deref(), body.limit)
            .await
            .map(SyncOutcome::OneWay),
        SyncDirection::Bidirectional => state
            .sync
            .bidirectional_sync(partner, strategy)
            .await
            .map(SyncOutcome::Bidirectional),
    };

    let outcome = result.map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}

pub(super) async fn sync_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<SyncStatusResponse>>, ApiError> {
    let partner = parse_partner(&req_id.0, query.partner.as_deref())?;
    let statuses = state
        .sync
        .sync_status(partner)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        SyncStatusResponse {
            integrations: statuses.into_iter().map(IntegrationItem::from).collect(),
        },
        req_id.0,
    )))
}
