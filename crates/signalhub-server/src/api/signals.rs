use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalhub_core::{Signal, SignalType};
use signalhub_db::SignalStore;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(rename = "type")]
    signal_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SignalPage {
    signals: Vec<SignalItem>,
    limit: i64,
    offset: i64,
}

/// A stored signal without its raw source payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SignalItem {
    id: i64,
    #[serde(rename = "type")]
    signal_type: SignalType,
    source: String,
    title: Option<String>,
    company_name: String,
    company_url: Option<String>,
    job_url: Option<String>,
    location: Option<String>,
    posted_date: Option<DateTime<Utc>>,
    processed: bool,
    created_at: DateTime<Utc>,
}

impl From<Signal> for SignalItem {
    fn from(signal: Signal) -> Self {
        Self {
            id: signal.id,
            signal_type: signal.signal_type,
            source: signal.source,
            title: signal.title,
            company_name: signal.company_name,
            company_url: signal.company_url,
            job_url: signal.job_url,
            location: signal.location,
            posted_date: signal.posted_date,
            processed: signal.processed,
            created_at: signal.created_at,
        }
    }
}

pub(super) async fn list_signals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<SignalPage>>, ApiError> {
    let signal_type = query
        .signal_type
        .as_deref()
        .map(str::parse::<SignalType>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;
    let limit = normalize_limit(query.limit);
    let offset = query.offset.unwrap_or(0).max(0);

    let signals = state
        .store
        .list_signals(signal_type, limit, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        SignalPage {
            signals: signals.into_iter().map(SignalItem::from).collect(),
            limit,
            offset,
        },
        req_id.0,
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use signalhub_core::{NewSignal, SignalType};
    use signalhub_db::{MemoryStore, SignalStore};

    use crate::api::test_support::{send, test_config, test_state};

    async fn seed(store: &MemoryStore, company: &str, signal_type: SignalType) {
        store
            .insert_signal_if_new(&NewSignal {
                signal_type,
                source: "serpapi".to_string(),
                title: Some("Head of Sales".to_string()),
                company_name: company.to_string(),
                company_url: None,
                job_url: Some(format!("https://jobs.example/{company}")),
                location: Some("Brazil".to_string()),
                posted_date: None,
                raw_data: json!({ "secret": "raw" }),
            })
            .await
            .expect("insert")
            .expect("new signal");
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn pages_newest_first_without_raw_payload() {
        let store = Arc::new(MemoryStore::new());
        for company in ["Acme", "Beta", "Cora"] {
            seed(&store, company, SignalType::JobPosting).await;
        }
        let state = test_state(Arc::clone(&store), &test_config());

        let (status, body) = send(state.clone(), get("/api/v1/signals?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        let page = body["data"]["signals"].as_array().expect("array");
        let companies: Vec<_> = page.iter().map(|s| s["companyName"].clone()).collect();
        assert_eq!(companies, [json!("Cora"), json!("Beta")]);
        assert_eq!(page[0]["type"], "job_posting");
        assert!(page[0].get("rawData").is_none());
        assert!(!body.to_string().contains("secret"));

        let (_, body) = send(state, get("/api/v1/signals?limit=2&offset=2")).await;
        let page = body["data"]["signals"].as_array().expect("array");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["companyName"], "Acme");
        assert_eq!(body["data"]["offset"], 2);
    }

    #[tokio::test]
    async fn filters_by_type_and_rejects_unknown_types() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "Acme", SignalType::JobPosting).await;
        seed(&store, "Beta", SignalType::Expansion).await;
        let state = test_state(Arc::clone(&store), &test_config());

        let (status, body) = send(state.clone(), get("/api/v1/signals?type=expansion")).await;
        assert_eq!(status, StatusCode::OK);
        let page = body["data"]["signals"].as_array().expect("array");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["companyName"], "Beta");
        assert_eq!(body["data"]["limit"], 50);

        let (status, body) = send(state, get("/api/v1/signals?type=rumour")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }
}
