use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use signalhub_core::{FundingFilters, IngestFilters, Signal};
use signalhub_pipeline::{IngestValidationError, IngestionStats, PipelineError};

use crate::middleware::{bearer_matches, RequestId};

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

const CRON_KEYWORDS: [&str; 4] = ["Head of Engineering", "VP of Sales", "Director", "CTO"];
const CRON_DAYS_BACK: u32 = 7;
const CRON_MIN_FUNDING: f64 = 1_000_000.0;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct IngestRequest {
    signal_type: Option<String>,
    keywords: Vec<String>,
    location: Option<String>,
    days_back: Option<u32>,
    use_queue: bool,
    sources: Option<Vec<String>>,
    min_amount: Option<f64>,
    rounds: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SignalSummary {
    id: i64,
    company_name: String,
    title: Option<String>,
    source: String,
}

impl From<&Signal> for SignalSummary {
    fn from(signal: &Signal) -> Self {
        Self {
            id: signal.id,
            company_name: signal.company_name.clone(),
            title: signal.title.clone(),
            source: signal.source.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IngestResponse {
    success: bool,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<IngestionStats>,
    signals: Vec<SignalSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CronResponse {
    success: bool,
    job_postings: usize,
    funding_signals: usize,
    stats: IngestionStats,
}

/// Job-posting ingestion by default; `signalType: "funding"` switches to
/// funding collection.
pub(super) async fn ingest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let response = match body.signal_type.as_deref() {
        None | Some("job_posting") => {
            let filters = IngestFilters {
                keywords: body.keywords,
                location: body.location,
                days_back: body.days_back,
            };
            let outcome = state
                .ingestor
                .ingest_job_postings(&filters, body.use_queue, body.sources.as_deref())
                .await
                .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
            IngestResponse {
                success: true,
                count: outcome.signals.len(),
                signals: outcome.signals.iter().map(SignalSummary::from).collect(),
                stats: Some(outcome.stats),
            }
        }
        Some("funding") => {
            let filters = FundingFilters {
                min_amount: body.min_amount,
                rounds: body.rounds,
                days_back: body.days_back,
            };
            let signals = state
                .ingestor
                .ingest_funding_signals(&filters)
                .await
                .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
            IngestResponse {
                success: true,
                count: signals.len(),
                signals: signals.iter().map(SignalSummary::from).collect(),
                stats: None,
            }
        }
        Some(other) => {
            let err: PipelineError =
                IngestValidationError::UnknownSignalType(other.to_string()).into();
            return Err(map_pipeline_error(req_id.0, &err));
        }
    };

    Ok(Json(ApiResponse::new(response, req_id.0)))
}

/// Scheduled collection: fixed senior-role keywords at the default location,
/// then funding rounds of at least one million. Runs inline.
pub(super) async fn cron_ingest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Response {
    if !bearer_matches(&headers, state.cron.secret.as_deref()) {
        tracing::warn!("cron trigger rejected: bad or missing secret");
        return ApiError::new(req_id.0, "unauthorized", "invalid cron secret").into_response();
    }

    let filters = IngestFilters {
        keywords: CRON_KEYWORDS.iter().map(|k| (*k).to_string()).collect(),
        location: Some(state.cron.default_location.clone()),
        days_back: Some(CRON_DAYS_BACK),
    };
    let jobs = match state.ingestor.run_now(&filters, None).await {
        Ok(outcome) => outcome,
        Err(e) => return map_pipeline_error(req_id.0, &e).into_response(),
    };
    let funding = match state
        .ingestor
        .ingest_funding_signals(&FundingFilters {
            min_amount: Some(CRON_MIN_FUNDING),
            rounds: Vec::new(),
            days_back: Some(CRON_DAYS_BACK),
        })
        .await
    {
        Ok(signals) => signals,
        Err(e) => return map_pipeline_error(req_id.0, &e).into_response(),
    };

    tracing::info!(
        job_postings = jobs.stats.total_collected,
        funding_signals = funding.len(),
        "cron ingestion completed"
    );
    (
        StatusCode::OK,
        Json(ApiResponse::new(
            CronResponse {
                success: true,
                job_postings: jobs.stats.total_collected,
                funding_signals: funding.len(),
                stats: jobs.stats,
            },
            req_id.0,
        )),
    )
        .into_response()
}
