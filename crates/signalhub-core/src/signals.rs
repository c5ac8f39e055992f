use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::wire_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    JobPosting,
    FundingAnnouncement,
    Expansion,
    HiringSpike,
    SkillsShift,
    MergerAcquisition,
}

wire_enum!(SignalType, "signal type", {
    JobPosting => "job_posting",
    FundingAnnouncement => "funding_announcement",
    Expansion => "expansion",
    HiringSpike => "hiring_spike",
    SkillsShift => "skills_shift",
    MergerAcquisition => "merger_acquisition",
});

/// A stored signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub signal_type: SignalType,
    pub source: String,
    pub title: Option<String>,
    pub company_name: String,
    pub company_url: Option<String>,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field combination used to reject duplicate signals at the store.
///
/// Funding announcements are keyed on the announcement date; every other
/// signal type is keyed on its job URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    ByUrl {
        signal_type: SignalType,
        company_name: String,
        job_url: Option<String>,
    },
    ByDate {
        signal_type: SignalType,
        company_name: String,
        posted_date: Option<DateTime<Utc>>,
    },
}

/// A signal ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub signal_type: SignalType,
    pub source: String,
    pub title: Option<String>,
    pub company_name: String,
    pub company_url: Option<String>,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
}

impl NaturalKey {
    #[must_use]
    pub fn new(
        signal_type: SignalType,
        company_name: &str,
        job_url: Option<&str>,
        posted_date: Option<DateTime<Utc>>,
    ) -> Self {
        match signal_type {
            SignalType::FundingAnnouncement => NaturalKey::ByDate {
                signal_type,
                company_name: company_name.to_string(),
                posted_date,
            },
            _ => NaturalKey::ByUrl {
                signal_type,
                company_name: company_name.to_string(),
                job_url: job_url.map(ToString::to_string),
            },
        }
    }
}

impl NewSignal {
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(
            self.signal_type,
            &self.company_name,
            self.job_url.as_deref(),
            self.posted_date,
        )
    }
}

impl Signal {
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(
            self.signal_type,
            &self.company_name,
            self.job_url.as_deref(),
            self.posted_date,
        )
    }
}

/// A job posting as returned by a collector, before dedup and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: String,
    pub title: String,
    pub company_name: String,
    pub company_url: Option<String>,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl RawPosting {
    /// In-batch dedup key: `company:title:url`.
    #[must_use]
    pub fn batch_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.company_name,
            self.title,
            self.job_url.as_deref().unwrap_or_default()
        )
    }

    #[must_use]
    pub fn into_new_signal(self) -> NewSignal {
        let raw_data = if self.raw.is_null() {
            serde_json::json!({ "description": self.description })
        } else {
            self.raw
        };
        NewSignal {
            signal_type: SignalType::JobPosting,
            source: self.source,
            title: Some(self.title),
            company_name: self.company_name,
            company_url: self.company_url,
            job_url: self.job_url,
            location: self.location,
            posted_date: self.posted_date,
            raw_data,
        }
    }
}

/// A funding round as returned by the funding collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFundingEvent {
    pub source: String,
    pub company_name: String,
    pub company_url: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub round: Option<String>,
    pub announced_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub investors: Vec<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl RawFundingEvent {
    #[must_use]
    pub fn into_new_signal(self) -> NewSignal {
        let title = match (&self.round, self.amount) {
            (Some(round), Some(amount)) => Some(format!("{round} round ({amount})")),
            (Some(round), None) => Some(format!("{round} round")),
            (None, Some(amount)) => Some(format!("Funding round ({amount})")),
            (None, None) => None,
        };
        let raw_data = if self.raw.is_null() {
            serde_json::json!({
                "amount": self.amount,
                "currency": self.currency,
                "round": self.round,
                "investors": self.investors,
            })
        } else {
            self.raw
        };
        NewSignal {
            signal_type: SignalType::FundingAnnouncement,
            source: self.source,
            title,
            company_name: self.company_name,
            company_url: self.company_url,
            job_url: None,
            location: None,
            posted_date: self.announced_on,
            raw_data,
        }
    }
}

/// Company metadata attached to at most one signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub signal_id: i64,
    pub employee_count: Option<i32>,
    pub employee_count_in_target_country: Option<i32>,
    pub industry: Option<String>,
    pub headquarters: Option<String>,
    pub funding_total: Option<Decimal>,
    pub last_funding_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision_makers: serde_json::Value,
}

impl Enrichment {
    /// Country part of `headquarters`: the last comma-separated segment.
    #[must_use]
    pub fn headquarters_country(&self) -> Option<&str> {
        self.headquarters
            .as_deref()
            .and_then(|hq| hq.rsplit(',').next())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Filters accepted by job-posting collectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFilters {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub days_back: Option<u32>,
}

impl IngestFilters {
    /// Rate-limit key suffix for this request.
    #[must_use]
    pub fn location_key(&self) -> &str {
        self.location
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or("global")
    }
}

/// Filters accepted by the funding collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingFilters {
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub rounds: Vec<String>,
    pub days_back: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(url: Option<&str>) -> RawPosting {
        RawPosting {
            source: "serpapi".to_string(),
            title: "VP of Engineering".to_string(),
            company_name: "Acme".to_string(),
            company_url: None,
            job_url: url.map(ToString::to_string),
            location: Some("São Paulo, Brazil".to_string()),
            posted_date: None,
            description: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn signal_type_round_trips_wire_names() {
        for ty in [
            SignalType::JobPosting,
            SignalType::FundingAnnouncement,
            SignalType::Expansion,
            SignalType::HiringSpike,
            SignalType::SkillsShift,
            SignalType::MergerAcquisition,
        ] {
            assert_eq!(ty.as_str().parse::<SignalType>().unwrap(), ty);
        }
        assert!("unknown".parse::<SignalType>().is_err());
    }

    #[test]
    fn batch_key_uses_company_title_and_url() {
        assert_eq!(
            posting(Some("https://jobs.example/1")).batch_key(),
            "Acme:VP of Engineering:https://jobs.example/1"
        );
        assert_eq!(posting(None).batch_key(), "Acme:VP of Engineering:");
    }

    #[test]
    fn job_posting_natural_key_ignores_title() {
        let a = posting(Some("https://jobs.example/1")).into_new_signal();
        let mut b = posting(Some("https://jobs.example/1")).into_new_signal();
        b.title = Some("Director".to_string());
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn funding_natural_key_uses_posted_date() {
        let event = RawFundingEvent {
            source: "crunchbase".to_string(),
            company_name: "Acme".to_string(),
            company_url: None,
            amount: Some(Decimal::new(5_000_000, 0)),
            currency: Some("USD".to_string()),
            round: Some("series_a".to_string()),
            announced_on: Some(Utc::now()),
            investors: vec![],
            raw: serde_json::Value::Null,
        };
        let signal = event.clone().into_new_signal();
        assert_eq!(signal.signal_type, SignalType::FundingAnnouncement);
        assert!(matches!(
            signal.natural_key(),
            NaturalKey::ByDate { posted_date: Some(d), .. } if Some(d) == event.announced_on
        ));
    }

    #[test]
    fn headquarters_country_is_last_segment() {
        let enrichment = Enrichment {
            headquarters: Some("San Francisco, CA, United States".to_string()),
            ..Enrichment::default()
        };
        assert_eq!(enrichment.headquarters_country(), Some("United States"));

        let bare = Enrichment {
            headquarters: Some("Brazil".to_string()),
            ..Enrichment::default()
        };
        assert_eq!(bare.headquarters_country(), Some("Brazil"));
        assert_eq!(Enrichment::default().headquarters_country(), None);
    }

    #[test]
    fn location_key_defaults_to_global() {
        let filters = IngestFilters::default();
        assert_eq!(filters.location_key(), "global");
        let filters = IngestFilters {
            location: Some("Brazil".to_string()),
            ..IngestFilters::default()
        };
        assert_eq!(filters.location_key(), "Brazil");
    }
}
