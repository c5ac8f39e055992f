//! Partner and signal webhooks. These routes authenticate with HMAC
//! signatures over the raw body instead of bearer tokens.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use signalhub_core::PartnerKind;
use signalhub_pipeline::{PartnerWebhookOutcome, SignalWebhookOutcome, WebhookHandler};

use crate::middleware::RequestId;

use super::{map_webhook_error, ApiError, ApiResponse, AppState};

const LINKEDIN_SIGNATURE_HEADER: &str = "x-linkedin-signature";
const INDEED_SIGNATURE_HEADER: &str = "x-indeed-signature";
const SIGNAL_SIGNATURE_HEADER: &str = "x-webhook-signature";
const SIGNAL_SOURCE_HEADER: &str = "x-signal-source";

#[derive(Debug, Default, Deserialize)]
pub(super) struct ChallengeQuery {
    challenge: Option<String>,
}

/// Partners verify the endpoint by reading `challenge` at the top level, so
/// this reply skips the response envelope.
#[derive(Debug, Serialize)]
struct ChallengeResponse {
    challenge: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn partner_webhook(
    state: &AppState,
    request_id: String,
    partner: PartnerKind,
    challenge: Option<String>,
    signature: Option<&str>,
    body: &[u8],
) -> Result<Response, ApiError> {
    if let Some(challenge) = challenge {
        tracing::info!(%partner, "answering webhook challenge");
        return Ok(Json(ChallengeResponse {
            challenge: WebhookHandler::verify_webhook_challenge(&challenge),
        })
        .into_response());
    }

    let outcome = state
        .webhooks
        .process_partner_webhook(partner, body, signature)
        .await
        .map_err(|e| map_webhook_error(request_id.clone(), &e))?;
    Ok(Json(ApiResponse::<PartnerWebhookOutcome>::new(outcome, request_id)).into_response())
}

pub(super) async fn linkedin(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ChallengeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    partner_webhook(
        &state,
        req_id.0,
        PartnerKind::LinkedIn,
        query.challenge,
        header_str(&headers, LINKEDIN_SIGNATURE_HEADER),
        &body,
    )
    .await
}

pub(super) async fn indeed(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ChallengeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    partner_webhook(
        &state,
        req_id.0,
        PartnerKind::Indeed,
        query.challenge,
        header_str(&headers, INDEED_SIGNATURE_HEADER),
        &body,
    )
    .await
}

pub(super) async fn signals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<SignalWebhookOutcome>>, ApiError> {
    let outcome = state
        .webhooks
        .process_signal_webhook(
            &body,
            header_str(&headers, SIGNAL_SIGNATURE_HEADER),
            header_str(&headers, SIGNAL_SOURCE_HEADER),
        )
        .await
        .map_err(|e| map_webhook_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}
