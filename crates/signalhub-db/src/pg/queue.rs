use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PgStore;
use crate::store::{
    CounterState, CounterStore, JobCounts, JobStatus, JobStore, NewJob, QueuedJob,
    RetentionPolicy,
};
use crate::DbError;

const JOB_COLUMNS: &str = "id, kind, payload, priority, status, attempts, max_attempts, run_at, \
     last_error, result, created_at, finished_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: i64,
    kind: String,
    payload: serde_json::Value,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    last_error: Option<String>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(QueuedJob {
            id: row.id,
            kind: row.kind,
            payload: row.payload,
            priority: row.priority,
            status: JobStatus::parse(&row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: row.run_at,
            last_error: row.last_error,
            result: row.result,
            created_at: row.created_at,
            finished_at: row.finished_at,
        })
    }
}

fn secs_f64(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

#[async_trait]
impl CounterStore for PgStore {
    async fn increment_counter(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterState, DbError> {
        // One statement so concurrent workers never both open a fresh window.
        let (count, remaining): (i64, f64) = sqlx::query_as(
            "INSERT INTO rate_limit_counters (key, count, expires_at) \
             VALUES ($1, 1, NOW() + make_interval(secs => $2)) \
             ON CONFLICT (key) DO UPDATE SET \
               count = CASE WHEN rate_limit_counters.expires_at <= NOW() \
                            THEN 1 ELSE rate_limit_counters.count + 1 END, \
               expires_at = CASE WHEN rate_limit_counters.expires_at <= NOW() \
                                 THEN EXCLUDED.expires_at ELSE rate_limit_counters.expires_at END \
             RETURNING count, \
               GREATEST(EXTRACT(EPOCH FROM (expires_at - NOW())), 0)::DOUBLE PRECISION",
        )
        .bind(key)
        .bind(secs_f64(window))
        .fetch_one(&self.pool)
        .await?;

        Ok(CounterState {
            count,
            resets_in: Duration::from_secs_f64(remaining.max(0.0)),
        })
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn enqueue_job(&self, job: &NewJob) -> Result<QueuedJob, DbError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO ingest_jobs (kind, payload, priority, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&job.kind)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.max_attempts)
        .fetch_one(&self.pool)
        .await?;
        QueuedJob::try_from(row)
    }

    async fn claim_next_job(&self) -> Result<Option<QueuedJob>, DbError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE ingest_jobs \
             SET status = 'active', attempts = attempts + 1, started_at = NOW() \
             WHERE id = ( \
               SELECT id FROM ingest_jobs \
               WHERE status = 'waiting' AND run_at <= NOW() \
               ORDER BY priority, run_at, id \
               FOR UPDATE SKIP LOCKED \
               LIMIT 1 \
             ) \
             RETURNING {JOB_COLUMNS}"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueuedJob::try_from).transpose()
    }

    async fn complete_job(&self, id: i64, result: &serde_json::Value) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE ingest_jobs \
             SET status = 'completed', result = $2, last_error = NULL, finished_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry_job(
        &self,
        id: i64,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE ingest_jobs SET status = 'waiting', run_at = $2, last_error = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, id: i64, error: &str) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE ingest_jobs \
             SET status = 'failed', last_error = $2, finished_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: i64) -> Result<Option<QueuedJob>, DbError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM ingest_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueuedJob::try_from).transpose()
    }

    async fn job_counts(&self) -> Result<JobCounts, DbError> {
        let rows = sqlx::query_as::<_, (String, bool, i64)>(
            "SELECT status, (status = 'waiting' AND run_at > NOW()) AS delayed, COUNT(*) \
             FROM ingest_jobs \
             GROUP BY 1, 2",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = JobCounts::default();
        for (status, delayed, count) in rows {
            match JobStatus::parse(&status)? {
                JobStatus::Waiting if delayed => counts.delayed += count,
                JobStatus::Waiting => counts.waiting += count,
                JobStatus::Active => counts.active += count,
                JobStatus::Completed => counts.completed += count,
                JobStatus::Failed => counts.failed += count,
            }
        }
        Ok(counts)
    }

    async fn prune_jobs(&self, policy: &RetentionPolicy) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM ingest_jobs WHERE id IN ( \
               SELECT id FROM ingest_jobs \
               WHERE status = 'completed' AND finished_at < NOW() - make_interval(secs => $1) \
               UNION \
               SELECT id FROM ( \
                 SELECT id FROM ingest_jobs WHERE status = 'completed' \
                 ORDER BY finished_at DESC, id DESC OFFSET $2 \
               ) overflow \
               UNION \
               SELECT id FROM ingest_jobs \
               WHERE status = 'failed' AND finished_at < NOW() - make_interval(secs => $3) \
             )",
        )
        .bind(secs_f64(policy.completed_max_age))
        .bind(policy.completed_max_count)
        .bind(secs_f64(policy.failed_max_age))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
