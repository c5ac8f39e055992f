//! Bucket classification: ICP compliance filtering and rule-based bucket
//! assignment for unprocessed signals.
//!
//! Every signal the engine touches ends up `processed`, whether it was
//! assigned, rejected, or matched no rule. A processed signal is never
//! picked up again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use signalhub_core::{BucketType, BucketWithSignals, Enrichment, IcpConfig, Signal, SignalType};
use signalhub_db::{BucketStore, SignalStore, Store};

use crate::error::PipelineError;

/// Supplies company metadata for a signal that has none yet.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, signal: &Signal) -> Result<Option<Enrichment>, PipelineError>;
}

/// Enricher for deployments without an enrichment provider.
pub struct NullEnricher;

#[async_trait]
impl Enricher for NullEnricher {
    async fn enrich(&self, _signal: &Signal) -> Result<Option<Enrichment>, PipelineError> {
        Ok(None)
    }
}

/// Confidence each rule assigns and the title markers that make a posting senior.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRules {
    pub scale_confidence: f64,
    pub funding_boost_confidence: f64,
    pub expansion_confidence: f64,
    pub skills_shift_confidence: f64,
    /// Case-sensitive substrings of a job title.
    pub senior_markers: Vec<String>,
}

impl Default for BucketRules {
    fn default() -> Self {
        Self {
            scale_confidence: 0.8,
            funding_boost_confidence: 0.9,
            expansion_confidence: 0.85,
            skills_shift_confidence: 0.75,
            senior_markers: ["VP", "Head of", "Director", "Chief"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl BucketRules {
    /// Buckets `signal` belongs in, each with the confidence of the rule that
    /// matched. Rules are independent.
    #[must_use]
    pub fn assignments(&self, signal: &Signal) -> Vec<(BucketType, f64)> {
        let mut out = Vec::new();
        if signal.signal_type == SignalType::JobPosting {
            if let Some(title) = signal.title.as_deref() {
                if self.senior_markers.iter().any(|m| title.contains(m.as_str())) {
                    out.push((BucketType::Scale, self.scale_confidence));
                }
            }
        }
        match signal.signal_type {
            SignalType::FundingAnnouncement => {
                out.push((BucketType::FundingBoost, self.funding_boost_confidence));
            }
            SignalType::Expansion => out.push((BucketType::Expansion, self.expansion_confidence)),
            SignalType::SkillsShift => {
                out.push((BucketType::SkillsShift, self.skills_shift_confidence));
            }
            SignalType::JobPosting | SignalType::HiringSpike | SignalType::MergerAcquisition => {}
        }
        out
    }
}

/// Why a signal failed the ICP filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcpRejection {
    ExcludedHeadquarters(String),
    TooManyEmployees { count: i32, max: i32 },
    IndustryMismatch(String),
}

impl std::fmt::Display for IcpRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IcpRejection::ExcludedHeadquarters(country) => {
                write!(f, "headquarters in excluded country {country}")
            }
            IcpRejection::TooManyEmployees { count, max } => {
                write!(f, "{count} employees in target country exceeds {max}")
            }
            IcpRejection::IndustryMismatch(industry) => {
                write!(f, "industry {industry:?} not targeted")
            }
        }
    }
}

/// Checks `enrichment` against `icp`.
///
/// A signal with no enrichment (`None`) passes every criterion, so signals
/// still reach the buckets before or without an enrichment lookup. A single
/// criterion whose enrichment field is empty is skipped the same way.
///
/// # Errors
///
/// Returns the first failed criterion.
pub fn check_icp(enrichment: Option<&Enrichment>, icp: &IcpConfig) -> Result<(), IcpRejection> {
    let Some(enrichment) = enrichment else {
        return Ok(());
    };
    if let Some(country) = enrichment.headquarters_country() {
        if icp.excludes_hq_country(country) {
            return Err(IcpRejection::ExcludedHeadquarters(country.to_string()));
        }
    }
    if let Some(max) = icp.max_employees_in_target_country {
        let count = enrichment.employee_count_in_target_country.unwrap_or(0);
        if count > max {
            return Err(IcpRejection::TooManyEmployees { count, max });
        }
    }
    if let Some(industry) = enrichment.industry.as_deref() {
        if !icp.accepts_industry(industry) {
            return Err(IcpRejection::IndustryMismatch(industry.to_string()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStats {
    pub processed: usize,
    pub rejected: usize,
    pub assignments: usize,
}

pub struct BucketEngine {
    store: Arc<dyn Store>,
    enricher: Arc<dyn Enricher>,
    rules: BucketRules,
    batch_size: i64,
}

impl BucketEngine {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            enricher: Arc::new(NullEnricher),
            rules: BucketRules::default(),
            batch_size: 100,
        }
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: BucketRules) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Classifies every unprocessed signal, batch by batch, then returns the
    /// active buckets with their signals.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] when the store fails. Enrichment failures
    /// are logged and the signal is classified without enrichment.
    pub async fn process_signals(
        &self,
        icp: &IcpConfig,
    ) -> Result<Vec<BucketWithSignals>, PipelineError> {
        let stats = self.classify_pending(icp).await?;
        tracing::info!(
            processed = stats.processed,
            rejected = stats.rejected,
            assignments = stats.assignments,
            "signal classification finished"
        );
        Ok(self.store.list_buckets_with_signals().await?)
    }

    /// # Errors
    ///
    /// See [`BucketEngine::process_signals`].
    pub async fn classify_pending(
        &self,
        icp: &IcpConfig,
    ) -> Result<ClassificationStats, PipelineError> {
        let mut stats = ClassificationStats::default();
        let mut bucket_ids = HashMap::new();
        for bucket_type in BucketType::ALL {
            let bucket = self.store.ensure_bucket(bucket_type).await?;
            bucket_ids.insert(bucket_type, bucket.id);
        }
        loop {
            let batch = self.store.list_unprocessed_signals(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            for signal in batch {
                self.classify_one(&signal, icp, &bucket_ids, &mut stats)
                    .await?;
            }
        }
        Ok(stats)
    }

    async fn classify_one(
        &self,
        signal: &Signal,
        icp: &IcpConfig,
        bucket_ids: &HashMap<BucketType, i64>,
        stats: &mut ClassificationStats,
    ) -> Result<(), PipelineError> {
        let enrichment = self.enrichment_for(signal).await?;
        stats.processed += 1;

        if let Err(rejection) = check_icp(enrichment.as_ref(), icp) {
            tracing::debug!(signal_id = signal.id, reason = %rejection, "signal outside ICP");
            stats.rejected += 1;
            self.store.mark_signal_processed(signal.id).await?;
            return Ok(());
        }

        for (bucket_type, confidence) in self.rules.assignments(signal) {
            let bucket_id = match bucket_ids.get(&bucket_type) {
                Some(id) => *id,
                None => self.store.ensure_bucket(bucket_type).await?.id,
            };
            self.store
                .upsert_assignment(bucket_id, signal.id, confidence)
                .await?;
            stats.assignments += 1;
        }
        self.store.mark_signal_processed(signal.id).await?;
        Ok(())
    }

    async fn enrichment_for(&self, signal: &Signal) -> Result<Option<Enrichment>, PipelineError> {
        if let Some(existing) = self.store.get_enrichment(signal.id).await? {
            return Ok(Some(existing));
        }
        match self.enricher.enrich(signal).await {
            Ok(Some(mut enrichment)) => {
                enrichment.signal_id = signal.id;
                self.store.upsert_enrichment(&enrichment).await?;
                Ok(Some(enrichment))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                tracing::warn!(signal_id = signal.id, error = %err, "enrichment failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn signal(signal_type: SignalType, title: Option<&str>) -> Signal {
        Signal {
            id: 1,
            signal_type,
            source: "serpapi".to_string(),
            title: title.map(String::from),
            company_name: "Acme".to_string(),
            company_url: None,
            job_url: None,
            location: None,
            posted_date: None,
            raw_data: serde_json::Value::Null,
            processed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn senior_posting_goes_to_scale() {
        let rules = BucketRules::default();
        let got = rules.assignments(&signal(SignalType::JobPosting, Some("VP of Engineering")));
        assert_eq!(got, vec![(BucketType::Scale, 0.8)]);
    }

    #[test]
    fn junior_posting_matches_nothing() {
        let rules = BucketRules::default();
        assert!(rules
            .assignments(&signal(SignalType::JobPosting, Some("Backend Engineer")))
            .is_empty());
        // Markers are case-sensitive.
        assert!(rules
            .assignments(&signal(SignalType::JobPosting, Some("vp of sales")))
            .is_empty());
    }

    #[test]
    fn type_rules_carry_their_confidence() {
        let rules = BucketRules::default();
        assert_eq!(
            rules.assignments(&signal(SignalType::FundingAnnouncement, None)),
            vec![(BucketType::FundingBoost, 0.9)]
        );
        assert_eq!(
            rules.assignments(&signal(SignalType::Expansion, None)),
            vec![(BucketType::Expansion, 0.85)]
        );
        assert_eq!(
            rules.assignments(&signal(SignalType::SkillsShift, None)),
            vec![(BucketType::SkillsShift, 0.75)]
        );
        assert!(rules
            .assignments(&signal(SignalType::MergerAcquisition, None))
            .is_empty());
    }

    #[test]
    fn icp_rejects_excluded_headquarters() {
        let enrichment = Enrichment {
            headquarters: Some("São Paulo, Brazil".to_string()),
            ..Enrichment::default()
        };
        assert_eq!(
            check_icp(Some(&enrichment), &IcpConfig::default()),
            Err(IcpRejection::ExcludedHeadquarters("Brazil".to_string()))
        );
    }

    #[test]
    fn icp_rejects_large_local_headcount() {
        let enrichment = Enrichment {
            employee_count_in_target_country: Some(250),
            ..Enrichment::default()
        };
        assert_eq!(
            check_icp(Some(&enrichment), &IcpConfig::default()),
            Err(IcpRejection::TooManyEmployees {
                count: 250,
                max: 100
            })
        );
    }

    #[test]
    fn icp_checks_industry_only_when_present() {
        let icp = IcpConfig::default();
        let retail = Enrichment {
            industry: Some("Retail".to_string()),
            ..Enrichment::default()
        };
        assert!(matches!(
            check_icp(Some(&retail), &icp),
            Err(IcpRejection::IndustryMismatch(_))
        ));
        assert!(check_icp(Some(&Enrichment::default()), &icp).is_ok());
        assert!(check_icp(None, &icp).is_ok());
    }

    #[test]
    fn unenriched_signal_passes_even_a_strict_icp() {
        let icp = IcpConfig {
            excluded_hq_countries: vec!["Brazil".to_string(), "Argentina".to_string()],
            max_employees_in_target_country: Some(0),
            industries: vec!["Biotech".to_string()],
            ..IcpConfig::default()
        };
        assert_eq!(check_icp(None, &icp), Ok(()));
    }
}
