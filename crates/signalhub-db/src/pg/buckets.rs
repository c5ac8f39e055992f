use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalhub_core::{
    ActionBucket, AssignedSignal, BucketAssignment, BucketType, BucketWithSignals,
    CandidateProfile, IcpConfig, NewCandidateProfile, Signal,
};

use super::signals::SignalRow;
use super::{parse_column, PgStore};
use crate::store::BucketStore;
use crate::DbError;

const BUCKET_COLUMNS: &str = "id, bucket_type, name, description, priority, is_active, created_at";

const CANDIDATE_COLUMNS: &str = "id, bucket_id, signal_id, full_name, current_title, \
     current_company, linkedin_url, skills, tenure_months, likelihood_to_move, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct BucketRow {
    id: i64,
    bucket_type: String,
    name: String,
    description: Option<String>,
    priority: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BucketRow> for ActionBucket {
    type Error = DbError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        Ok(ActionBucket {
            id: row.id,
            bucket_type: parse_column::<BucketType>("action_buckets.bucket_type", &row.bucket_type)?,
            name: row.name,
            description: row.description,
            priority: row.priority,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AssignedSignalRow {
    bucket_id: i64,
    confidence: f64,
    #[sqlx(flatten)]
    signal: SignalRow,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    bucket_id: i64,
    signal_id: Option<i64>,
    full_name: String,
    current_title: Option<String>,
    current_company: Option<String>,
    linkedin_url: Option<String>,
    skills: Vec<String>,
    tenure_months: Option<i32>,
    likelihood_to_move: f64,
    created_at: DateTime<Utc>,
}

impl From<CandidateRow> for CandidateProfile {
    fn from(row: CandidateRow) -> Self {
        CandidateProfile {
            id: row.id,
            bucket_id: row.bucket_id,
            signal_id: row.signal_id,
            full_name: row.full_name,
            current_title: row.current_title,
            current_company: row.current_company,
            linkedin_url: row.linkedin_url,
            skills: row.skills,
            tenure_months: row.tenure_months,
            likelihood_to_move: row.likelihood_to_move,
            created_at: row.created_at,
        }
    }
}

impl PgStore {
    /// Attach assigned signals to `buckets`, preserving bucket order.
    async fn with_signals(
        &self,
        buckets: Vec<ActionBucket>,
    ) -> Result<Vec<BucketWithSignals>, DbError> {
        if buckets.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = buckets.iter().map(|b| b.id).collect();
        let rows = sqlx::query_as::<_, AssignedSignalRow>(
            "SELECT ba.bucket_id, ba.confidence, \
                    s.id, s.signal_type, s.source, s.title, s.company_name, s.company_url, \
                    s.job_url, s.location, s.posted_date, s.raw_data, s.processed, \
                    s.created_at, s.updated_at \
             FROM bucket_assignments ba \
             JOIN signals s ON s.id = ba.signal_id \
             WHERE ba.bucket_id = ANY($1) \
             ORDER BY ba.confidence DESC, s.id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_bucket: HashMap<i64, Vec<AssignedSignal>> = HashMap::new();
        for row in rows {
            by_bucket
                .entry(row.bucket_id)
                .or_default()
                .push(AssignedSignal {
                    signal: Signal::try_from(row.signal)?,
                    confidence: row.confidence,
                });
        }

        Ok(buckets
            .into_iter()
            .map(|bucket| {
                let signals = by_bucket.remove(&bucket.id).unwrap_or_default();
                BucketWithSignals { bucket, signals }
            })
            .collect())
    }
}

#[async_trait]
impl BucketStore for PgStore {
    async fn ensure_bucket(&self, bucket_type: BucketType) -> Result<ActionBucket, DbError> {
        // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row too.
        let row = sqlx::query_as::<_, BucketRow>(&format!(
            "INSERT INTO action_buckets (bucket_type, name, description, priority) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (bucket_type) DO UPDATE SET bucket_type = EXCLUDED.bucket_type \
             RETURNING {BUCKET_COLUMNS}"
        ))
        .bind(bucket_type.as_str())
        .bind(bucket_type.display_name())
        .bind(bucket_type.description())
        .bind(bucket_type.priority())
        .fetch_one(&self.pool)
        .await?;
        ActionBucket::try_from(row)
    }

    async fn get_bucket(&self, id: i64) -> Result<Option<ActionBucket>, DbError> {
        let row = sqlx::query_as::<_, BucketRow>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM action_buckets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ActionBucket::try_from).transpose()
    }

    async fn upsert_assignment(
        &self,
        bucket_id: i64,
        signal_id: i64,
        confidence: f64,
    ) -> Result<BucketAssignment, DbError> {
        let assignment = sqlx::query_as::<_, (i64, i64, i64, f64, DateTime<Utc>, DateTime<Utc>)>(
            "INSERT INTO bucket_assignments (bucket_id, signal_id, confidence) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (bucket_id, signal_id) DO UPDATE SET \
               confidence = EXCLUDED.confidence, updated_at = NOW() \
             RETURNING id, bucket_id, signal_id, confidence, created_at, updated_at",
        )
        .bind(bucket_id)
        .bind(signal_id)
        .bind(confidence)
        .fetch_one(&self.pool)
        .await?;

        let (id, bucket_id, signal_id, confidence, created_at, updated_at) = assignment;
        Ok(BucketAssignment {
            id,
            bucket_id,
            signal_id,
            confidence,
            created_at,
            updated_at,
        })
    }

    async fn list_buckets_with_signals(&self) -> Result<Vec<BucketWithSignals>, DbError> {
        let rows = sqlx::query_as::<_, BucketRow>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM action_buckets \
             WHERE is_active = true \
             ORDER BY priority DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        let buckets = rows
            .into_iter()
            .map(ActionBucket::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.with_signals(buckets).await
    }

    async fn get_bucket_with_signals(
        &self,
        id: i64,
    ) -> Result<Option<BucketWithSignals>, DbError> {
        let Some(bucket) = self.get_bucket(id).await? else {
            return Ok(None);
        };
        Ok(self.with_signals(vec![bucket]).await?.into_iter().next())
    }

    async fn insert_candidates(
        &self,
        candidates: &[NewCandidateProfile],
    ) -> Result<Vec<CandidateProfile>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let row = sqlx::query_as::<_, CandidateRow>(&format!(
                "INSERT INTO candidate_profiles \
                   (bucket_id, signal_id, full_name, current_title, current_company, \
                    linkedin_url, skills, tenure_months, likelihood_to_move) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 RETURNING {CANDIDATE_COLUMNS}"
            ))
            .bind(candidate.bucket_id)
            .bind(candidate.signal_id)
            .bind(&candidate.full_name)
            .bind(candidate.current_title.as_deref())
            .bind(candidate.current_company.as_deref())
            .bind(candidate.linkedin_url.as_deref())
            .bind(&candidate.skills)
            .bind(candidate.tenure_months)
            .bind(candidate.likelihood_to_move)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(CandidateProfile::from(row));
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_candidates(
        &self,
        bucket_id: i64,
        limit: i64,
    ) -> Result<Vec<CandidateProfile>, DbError> {
        let rows = sqlx::query_as::<_, CandidateRow>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidate_profiles \
             WHERE bucket_id = $1 \
             ORDER BY likelihood_to_move DESC, id \
             LIMIT $2"
        ))
        .bind(bucket_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CandidateProfile::from).collect())
    }

    async fn load_icp_config(&self) -> Result<Option<IcpConfig>, DbError> {
        let value = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT config FROM icp_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        value
            .map(|v| serde_json::from_value(v).map_err(DbError::from))
            .transpose()
    }

    async fn save_icp_config(&self, config: &IcpConfig) -> Result<(), DbError> {
        let value = serde_json::to_value(config)?;
        sqlx::query(
            "INSERT INTO icp_config (id, config) VALUES (1, $1) \
             ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config, updated_at = NOW()",
        )
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
