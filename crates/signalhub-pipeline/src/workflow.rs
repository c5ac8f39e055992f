//! Turns a bucket's primary signal into ranked candidate profiles.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use signalhub_core::{BucketType, CandidateProfile, IcpConfig, NewCandidateProfile};
use signalhub_db::{BucketStore, Store};

use crate::error::PipelineError;

/// Who to look for, derived from the bucket type and the primary signal.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub company: String,
    pub titles: Vec<String>,
    pub min_years_experience: u32,
    pub location: String,
}

/// A person returned by a [`CandidateSource`], before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLead {
    pub full_name: String,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub linkedin_url: Option<String>,
    pub skills: Vec<String>,
    pub tenure_months: Option<i32>,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn find_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<CandidateLead>, PipelineError>;
}

/// One lead per target title with a random 12 to 47 month tenure. Stands in
/// for a people-search provider.
pub struct SampleCandidateSource;

#[async_trait]
impl CandidateSource for SampleCandidateSource {
    async fn find_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<CandidateLead>, PipelineError> {
        let mut rng = rand::rng();
        Ok(query
            .titles
            .iter()
            .enumerate()
            .map(|(i, title)| CandidateLead {
                full_name: format!("Candidate {}", i + 1),
                current_title: Some(title.clone()),
                current_company: Some(query.company.clone()),
                linkedin_url: Some(format!("https://linkedin.com/in/candidate{i}")),
                skills: Vec::new(),
                tenure_months: Some(rng.random_range(12..48)),
            })
            .collect())
    }
}

/// Tenure-based likelihood-to-move heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodScorer {
    pub base: f64,
    pub long_tenure_months: i32,
    pub long_tenure_bonus: f64,
    pub mid_tenure_months: i32,
    pub mid_tenure_bonus: f64,
    /// Half-width of the uniform perturbation added to break ties.
    pub jitter: f64,
    /// Candidates must score strictly above this to be kept.
    pub keep_above: f64,
    pub max_candidates: usize,
}

impl Default for LikelihoodScorer {
    fn default() -> Self {
        Self {
            base: 0.5,
            long_tenure_months: 24,
            long_tenure_bonus: 0.3,
            mid_tenure_months: 12,
            mid_tenure_bonus: 0.1,
            jitter: 0.1,
            keep_above: 0.5,
            max_candidates: 10,
        }
    }
}

impl LikelihoodScorer {
    /// Default thresholds with no perturbation.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            jitter: 0.0,
            ..Self::default()
        }
    }

    /// Score before perturbation.
    #[must_use]
    pub fn base_score(&self, tenure_months: Option<i32>) -> f64 {
        match tenure_months {
            Some(t) if t >= self.long_tenure_months => self.base + self.long_tenure_bonus,
            Some(t) if t >= self.mid_tenure_months => self.base + self.mid_tenure_bonus,
            _ => self.base,
        }
    }

    #[must_use]
    pub fn score(&self, tenure_months: Option<i32>) -> f64 {
        let mut score = self.base_score(tenure_months);
        if self.jitter > 0.0 {
            score += rand::rng().random_range(-self.jitter..=self.jitter);
        }
        score.clamp(0.0, 1.0)
    }

    /// Scores, filters and ranks `leads`, best first.
    #[must_use]
    pub fn rank(&self, leads: Vec<CandidateLead>) -> Vec<(CandidateLead, f64)> {
        let mut scored: Vec<(CandidateLead, f64)> = leads
            .into_iter()
            .map(|lead| {
                let score = self.score(lead.tenure_months);
                (lead, score)
            })
            .filter(|(_, score)| *score > self.keep_above)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.max_candidates);
        scored
    }
}

pub struct CandidateWorkflow {
    store: Arc<dyn Store>,
    source: Arc<dyn CandidateSource>,
    scorer: LikelihoodScorer,
}

impl CandidateWorkflow {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            source: Arc::new(SampleCandidateSource),
            scorer: LikelihoodScorer::default(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: LikelihoodScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Finds, scores and stores candidates for the bucket's highest-confidence
    /// signal. A bucket with no signals yields no candidates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BucketNotFound`] for an unknown bucket and
    /// propagates store and candidate-source failures.
    pub async fn trigger(
        &self,
        bucket_id: i64,
        icp: &IcpConfig,
    ) -> Result<Vec<CandidateProfile>, PipelineError> {
        let bucket = self
            .store
            .get_bucket_with_signals(bucket_id)
            .await?
            .ok_or(PipelineError::BucketNotFound(bucket_id))?;
        let Some(primary) = bucket.primary_signal() else {
            tracing::info!(bucket_id, "bucket has no signals; nothing to trigger");
            return Ok(Vec::new());
        };

        let query = query_for(bucket.bucket.bucket_type, &primary.signal.company_name, icp);
        let leads = self.source.find_candidates(&query).await?;
        let found = leads.len();
        let signal_id = primary.signal.id;
        let ranked: Vec<NewCandidateProfile> = self
            .scorer
            .rank(leads)
            .into_iter()
            .map(|(lead, score)| NewCandidateProfile {
                bucket_id,
                signal_id: Some(signal_id),
                full_name: lead.full_name,
                current_title: lead.current_title,
                current_company: lead.current_company,
                linkedin_url: lead.linkedin_url,
                skills: lead.skills,
                tenure_months: lead.tenure_months,
                likelihood_to_move: score,
            })
            .collect();

        let stored = self.store.insert_candidates(&ranked).await?;
        tracing::info!(
            bucket_id,
            signal_id,
            found,
            kept = stored.len(),
            "candidate workflow finished"
        );
        Ok(stored)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] when the store fails.
    pub async fn list_candidates(
        &self,
        bucket_id: i64,
        limit: i64,
    ) -> Result<Vec<CandidateProfile>, PipelineError> {
        Ok(self.store.list_candidates(bucket_id, limit).await?)
    }
}

fn query_for(bucket_type: BucketType, company: &str, icp: &IcpConfig) -> CandidateQuery {
    let profile = bucket_type.ideal_profile();
    CandidateQuery {
        company: company.to_string(),
        titles: profile.titles.iter().map(|t| (*t).to_string()).collect(),
        min_years_experience: profile.min_years_experience,
        location: icp.target_country.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str, tenure: Option<i32>) -> CandidateLead {
        CandidateLead {
            full_name: name.to_string(),
            current_title: None,
            current_company: None,
            linkedin_url: None,
            skills: Vec::new(),
            tenure_months: tenure,
        }
    }

    #[test]
    fn longer_tenure_scores_strictly_higher() {
        let scorer = LikelihoodScorer::default();
        assert!((scorer.base_score(Some(30)) - 0.8).abs() < 1e-9);
        assert!((scorer.base_score(Some(10)) - 0.5).abs() < 1e-9);
        assert!(scorer.base_score(Some(30)) > scorer.base_score(Some(10)));
    }

    #[test]
    fn tenure_thresholds_are_inclusive() {
        let scorer = LikelihoodScorer::default();
        assert!((scorer.base_score(Some(24)) - 0.8).abs() < 1e-9);
        assert!((scorer.base_score(Some(12)) - 0.6).abs() < 1e-9);
        assert!((scorer.base_score(Some(23)) - 0.6).abs() < 1e-9);
        assert!((scorer.base_score(None) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn jittered_score_stays_within_bounds() {
        let scorer = LikelihoodScorer::default();
        for _ in 0..200 {
            let score = scorer.score(Some(48));
            assert!((0.7..=0.9).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn rank_drops_base_scores_and_orders_best_first() {
        let scorer = LikelihoodScorer::deterministic();
        let ranked = scorer.rank(vec![
            lead("short", Some(6)),
            lead("mid", Some(18)),
            lead("long", Some(36)),
        ]);
        let names: Vec<&str> = ranked.iter().map(|(l, _)| l.full_name.as_str()).collect();
        assert_eq!(names, vec!["long", "mid"]);
    }

    #[test]
    fn rank_keeps_top_ten() {
        let scorer = LikelihoodScorer::deterministic();
        let leads = (0..15).map(|i| lead(&format!("c{i}"), Some(30))).collect();
        assert_eq!(scorer.rank(leads).len(), 10);
    }

    #[tokio::test]
    async fn sample_source_returns_one_lead_per_title() {
        let query = query_for(BucketType::FundingBoost, "Acme", &IcpConfig::default());
        let leads = SampleCandidateSource.find_candidates(&query).await.unwrap();
        assert_eq!(leads.len(), 3);
        assert!(leads
            .iter()
            .all(|l| l.tenure_months.is_some_and(|t| (12..48).contains(&t))));
        assert_eq!(query.location, "Brazil");
    }
}
