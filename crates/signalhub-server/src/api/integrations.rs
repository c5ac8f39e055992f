use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use signalhub_core::{IntegrationStatus, PartnerCredentials, PartnerKind};
use signalhub_pipeline::{IntegrationSummary, NewIntegration};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    partner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct RegisterRequest {
    partner: Option<String>,
    status: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    api_key: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    partner_id: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct IntegrationList {
    integrations: Vec<IntegrationSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegisteredIntegration {
    id: i64,
    partner: PartnerKind,
    status: IntegrationStatus,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validation(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

impl RegisterRequest {
    fn into_new_integration(self, request_id: &str) -> Result<NewIntegration, ApiError> {
        let partner = non_blank(self.partner)
            .ok_or_else(|| validation(request_id, "partner is required"))?
            .parse::<PartnerKind>()
            .map_err(|e| validation(request_id, e.to_string()))?;
        let status = non_blank(self.status)
            .map(|s| s.parse::<IntegrationStatus>())
            .transpose()
            .map_err(|e| validation(request_id, e.to_string()))?
            .unwrap_or(IntegrationStatus::Pending);

        Ok(NewIntegration {
            partner,
            status,
            credentials: PartnerCredentials {
                access_token: non_blank(self.access_token),
                refresh_token: non_blank(self.refresh_token),
                client_id: non_blank(self.client_id),
                client_secret: non_blank(self.client_secret),
                partner_id: non_blank(self.partner_id),
                api_key: non_blank(self.api_key),
            },
            webhook_secret: non_blank(self.webhook_secret),
        })
    }
}

pub(super) async fn list_integrations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<IntegrationList>>, ApiError> {
    let partner = non_blank(query.partner)
        .map(|p| p.parse::<PartnerKind>())
        .transpose()
        .map_err(|e| validation(&req_id.0, e.to_string()))?;
    let integrations = state
        .integrations
        .list(partner)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(IntegrationList { integrations }, req_id.0)))
}

pub(super) async fn register_integration(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredIntegration>>), ApiError> {
    let request = body.into_new_integration(&req_id.0)?;
    let integration = state
        .integrations
        .register(&request)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            RegisteredIntegration {
                id: integration.id,
                partner: integration.partner,
                status: integration.status,
            },
            req_id.0,
        )),
    ))
}
