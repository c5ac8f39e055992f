//! Funding rounds from the Crunchbase v4 API.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use signalhub_core::{FundingFilters, RawFundingEvent};

use crate::error::CollectorError;
use crate::http::{build_client, get_json, parse_base_url, HttpSettings};
use crate::FundingCollector;

const DEFAULT_BASE_URL: &str = "https://api.crunchbase.com/v4/";
const DEFAULT_DAYS_BACK: u32 = 30;
pub const SOURCE: &str = "crunchbase";

#[derive(Debug, Deserialize)]
struct FundingRoundsResponse {
    #[serde(default)]
    entities: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RoundProperties {
    organization_name: Option<String>,
    organization_website: Option<String>,
    money_raised: Option<MoneyRaised>,
    investment_type: Option<String>,
    announced_on: Option<String>,
    #[serde(default)]
    investor_names: Vec<String>,
}

/// Crunchbase reports money either as a bare number or as
/// `{value, currency}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MoneyRaised {
    Amount(f64),
    Money {
        value: Option<f64>,
        currency: Option<String>,
    },
}

impl MoneyRaised {
    fn value(&self) -> Option<f64> {
        match self {
            MoneyRaised::Amount(v) => Some(*v),
            MoneyRaised::Money { value, .. } => *value,
        }
    }

    fn currency(&self) -> Option<&str> {
        match self {
            MoneyRaised::Amount(_) => None,
            MoneyRaised::Money { currency, .. } => currency.as_deref(),
        }
    }
}

pub struct CrunchbaseCollector {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
}

impl CrunchbaseCollector {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, settings: &HttpSettings) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, settings, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`CollectorError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: Option<String>,
        settings: &HttpSettings,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self {
            client: build_client(settings)?,
            api_key,
            base_url: parse_base_url(&normalised)?,
        })
    }

    fn rounds_url(&self, api_key: &str, filters: &FundingFilters) -> Result<Url, CollectorError> {
        let days_back = filters.days_back.unwrap_or(DEFAULT_DAYS_BACK);
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days_back)))
            .unwrap_or_else(Utc::now)
            .date_naive();

        let mut url =
            self.base_url
                .join("funding-rounds")
                .map_err(|e| CollectorError::InvalidBaseUrl {
                    url: self.base_url.to_string(),
                    reason: e.to_string(),
                })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("user_key", api_key)
                .append_pair("announced_on", &format!(">={}", cutoff.format("%Y-%m-%d")));
            if !filters.rounds.is_empty() {
                pairs.append_pair("funding_type", &filters.rounds.join(","));
            }
        }
        Ok(url)
    }
}

fn to_event(value: serde_json::Value, min_amount: Option<f64>) -> Option<RawFundingEvent> {
    let properties: RoundProperties = value
        .get("properties")
        .cloned()
        .and_then(|p| serde_json::from_value(p).ok())
        .unwrap_or_default();

    let amount = properties.money_raised.as_ref().and_then(MoneyRaised::value);
    if let Some(min) = min_amount {
        if amount.unwrap_or(0.0) < min {
            return None;
        }
    }

    let company_name = properties
        .organization_name
        .filter(|n| !n.trim().is_empty())?;
    let announced_on = properties
        .announced_on
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    Some(RawFundingEvent {
        source: SOURCE.to_string(),
        company_name,
        company_url: properties.organization_website,
        amount: amount.and_then(|a| Decimal::try_from(a).ok()),
        currency: properties
            .money_raised
            .as_ref()
            .and_then(MoneyRaised::currency)
            .map(ToString::to_string),
        round: properties.investment_type,
        announced_on,
        investors: properties.investor_names,
        raw: value,
    })
}

#[async_trait]
impl FundingCollector for CrunchbaseCollector {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn collect_funding(
        &self,
        filters: &FundingFilters,
    ) -> Result<Vec<RawFundingEvent>, CollectorError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(source = SOURCE, "Crunchbase API key not configured");
            return Ok(Vec::new());
        };

        let body = get_json(&self.client, SOURCE, self.rounds_url(api_key, filters)?).await?;
        let response: FundingRoundsResponse =
            serde_json::from_value(body).map_err(|e| CollectorError::Deserialize {
                context: "crunchbase funding-rounds".to_string(),
                source: e,
            })?;

        let events: Vec<RawFundingEvent> = response
            .entities
            .into_iter()
            .filter_map(|entity| to_event(entity, filters.min_amount))
            .collect();
        tracing::debug!(source = SOURCE, count = events.len(), "collected funding rounds");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn below_minimum_amount_is_dropped() {
        let round = json!({"properties": {"organization_name": "Acme", "money_raised": 500_000.0}});
        assert!(to_event(round, Some(1_000_000.0)).is_none());
    }

    #[test]
    fn missing_amount_counts_as_zero_against_minimum() {
        let round = json!({"properties": {"organization_name": "Acme"}});
        assert!(to_event(round.clone(), Some(1.0)).is_none());
        assert!(to_event(round, None).is_some());
    }

    #[test]
    fn parses_structured_money_and_date() {
        let round = json!({
            "properties": {
                "organization_name": "Acme",
                "money_raised": {"value": 5_000_000.0, "currency": "USD"},
                "investment_type": "series_a",
                "announced_on": "2026-02-01",
                "investor_names": ["Fund One"]
            }
        });
        let event = to_event(round, Some(1_000_000.0)).unwrap();

        assert_eq!(event.amount, Some(Decimal::from(5_000_000)));
        assert_eq!(event.currency.as_deref(), Some("USD"));
        assert_eq!(event.round.as_deref(), Some("series_a"));
        assert_eq!(
            event.announced_on.map(|d| d.date_naive().to_string()),
            Some("2026-02-01".to_string())
        );
        assert_eq!(event.investors, vec!["Fund One".to_string()]);
    }
}
