use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use signalhub_core::{Enrichment, NewSignal, Signal, SignalType};

use super::{parse_column, PgStore};
use crate::store::SignalStore;
use crate::DbError;

pub(super) const SIGNAL_COLUMNS: &str = "id, signal_type, source, title, company_name, \
     company_url, job_url, location, posted_date, raw_data, processed, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct SignalRow {
    pub id: i64,
    pub signal_type: String,
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

impl TryFrom<SignalRow> for Signal {
    type Error = DbError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        Ok(Signal {
            id: row.id,
            signal_type: parse_column::<SignalType>("signals.signal_type", &row.signal_type)?,
            source: row.source,
            title: row.title,
            company_name: row.company_name,
            company_url: row.company_url,
            job_url: row.job_url,
            location: row.location,
            posted_date: row.posted_date,
            raw_data: row.raw_data,
            processed: row.processed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EnrichmentRow {
    signal_id: i64,
    employee_count: Option<i32>,
    employee_count_in_target_country: Option<i32>,
    industry: Option<String>,
    headquarters: Option<String>,
    funding_total: Option<Decimal>,
    last_funding_date: Option<DateTime<Utc>>,
    decision_makers: serde_json::Value,
}

impl From<EnrichmentRow> for Enrichment {
    fn from(row: EnrichmentRow) -> Self {
        Enrichment {
            signal_id: row.signal_id,
            employee_count: row.employee_count,
            employee_count_in_target_country: row.employee_count_in_target_country,
            industry: row.industry,
            headquarters: row.headquarters,
            funding_total: row.funding_total,
            last_funding_date: row.last_funding_date,
            decision_makers: row.decision_makers,
        }
    }
}

fn into_signals(rows: Vec<SignalRow>) -> Result<Vec<Signal>, DbError> {
    rows.into_iter().map(Signal::try_from).collect()
}

#[async_trait]
impl SignalStore for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_signal_if_new(&self, signal: &NewSignal) -> Result<Option<Signal>, DbError> {
        // Any unique violation here is one of the natural-key indexes.
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "INSERT INTO signals \
               (signal_type, source, title, company_name, company_url, job_url, \
                location, posted_date, raw_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT DO NOTHING \
             RETURNING {SIGNAL_COLUMNS}"
        ))
        .bind(signal.signal_type.as_str())
        .bind(&signal.source)
        .bind(signal.title.as_deref())
        .bind(&signal.company_name)
        .bind(signal.company_url.as_deref())
        .bind(signal.job_url.as_deref())
        .bind(signal.location.as_deref())
        .bind(signal.posted_date)
        .bind(&signal.raw_data)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Signal::try_from).transpose()
    }

    async fn get_signal(&self, id: i64) -> Result<Option<Signal>, DbError> {
        let row = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Signal::try_from).transpose()
    }

    async fn list_signals(
        &self,
        signal_type: Option<SignalType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE ($1::TEXT IS NULL OR signal_type = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(signal_type.map(SignalType::as_str))
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        into_signals(rows)
    }

    async fn list_unprocessed_signals(&self, limit: i64) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE processed = false \
             ORDER BY created_at, id \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_signals(rows)
    }

    async fn list_unprocessed_job_postings(
        &self,
        ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE processed = false AND signal_type = 'job_posting' \
               AND ($1::BIGINT[] IS NULL OR id = ANY($1)) \
             ORDER BY created_at, id \
             LIMIT $2"
        ))
        .bind(ids.map(<[i64]>::to_vec))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_signals(rows)
    }

    async fn mark_signal_processed(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE signals SET processed = true, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_signal_title_location(
        &self,
        id: i64,
        title: Option<&str>,
        location: Option<&str>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE signals SET title = $2, location = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(title)
        .bind(location)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get_enrichment(&self, signal_id: i64) -> Result<Option<Enrichment>, DbError> {
        let row = sqlx::query_as::<_, EnrichmentRow>(
            "SELECT signal_id, employee_count, employee_count_in_target_country, industry, \
                    headquarters, funding_total, last_funding_date, decision_makers \
             FROM enrichments WHERE signal_id = $1",
        )
        .bind(signal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Enrichment::from))
    }

    async fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<(), DbError> {
        let decision_makers = if enrichment.decision_makers.is_null() {
            serde_json::json!([])
        } else {
            enrichment.decision_makers.clone()
        };
        sqlx::query(
            "INSERT INTO enrichments \
               (signal_id, employee_count, employee_count_in_target_country, industry, \
                headquarters, funding_total, last_funding_date, decision_makers) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (signal_id) DO UPDATE SET \
               employee_count = EXCLUDED.employee_count, \
               employee_count_in_target_country = EXCLUDED.employee_count_in_target_country, \
               industry = EXCLUDED.industry, \
               headquarters = EXCLUDED.headquarters, \
               funding_total = EXCLUDED.funding_total, \
               last_funding_date = EXCLUDED.last_funding_date, \
               decision_makers = EXCLUDED.decision_makers, \
               updated_at = NOW()",
        )
        .bind(enrichment.signal_id)
        .bind(enrichment.employee_count)
        .bind(enrichment.employee_count_in_target_country)
        .bind(enrichment.industry.as_deref())
        .bind(enrichment.headquarters.as_deref())
        .bind(enrichment.funding_total)
        .bind(enrichment.last_funding_date)
        .bind(&decision_makers)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
