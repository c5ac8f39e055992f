use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalhub_core::{
    Application, ApplicationStatus, IntegrationStatus, NewApplication, NewSyncLog,
    PartnerCredentials, PartnerIntegration, PartnerJobPosting, PartnerJobStatus, PartnerKind,
    SyncLog, SyncStatus, SyncType,
};

use super::{parse_column, PgStore};
use crate::store::{NewPartnerJobPosting, PartnerStore};
use crate::DbError;

const INTEGRATION_COLUMNS: &str =
    "id, partner, status, credentials, webhook_secret, last_sync_at, created_at, updated_at";

const POSTING_COLUMNS: &str = "id, integration_id, signal_id, partner_job_id, status, metadata, \
     application_count, posted_at, created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, posting_id, partner_application_id, candidate_name, \
     candidate_email, status, applied_at, created_at, updated_at";

const SYNC_LOG_COLUMNS: &str = "id, integration_id, sync_type, status, records_processed, \
     records_failed, error_message, metadata, started_at, completed_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct IntegrationRow {
    id: i64,
    partner: String,
    status: String,
    credentials: serde_json::Value,
    webhook_secret: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntegrationRow> for PartnerIntegration {
    type Error = DbError;

    fn try_from(row: IntegrationRow) -> Result<Self, Self::Error> {
        Ok(PartnerIntegration {
            id: row.id,
            partner: parse_column::<PartnerKind>("partner_integrations.partner", &row.partner)?,
            status: parse_column::<IntegrationStatus>(
                "partner_integrations.status",
                &row.status,
            )?,
            credentials: serde_json::from_value::<PartnerCredentials>(row.credentials)?,
            webhook_secret: row.webhook_secret,
            last_sync_at: row.last_sync_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PostingRow {
    id: i64,
    integration_id: i64,
    signal_id: Option<i64>,
    partner_job_id: String,
    status: String,
    metadata: serde_json::Value,
    application_count: i32,
    posted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostingRow> for PartnerJobPosting {
    type Error = DbError;

    fn try_from(row: PostingRow) -> Result<Self, Self::Error> {
        Ok(PartnerJobPosting {
            id: row.id,
            integration_id: row.integration_id,
            signal_id: row.signal_id,
            partner_job_id: row.partner_job_id,
            status: parse_column::<PartnerJobStatus>("partner_job_postings.status", &row.status)?,
            metadata: row.metadata,
            application_count: row.application_count,
            posted_at: row.posted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    posting_id: i64,
    partner_application_id: String,
    candidate_name: Option<String>,
    candidate_email: Option<String>,
    status: String,
    applied_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = DbError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            posting_id: row.posting_id,
            partner_application_id: row.partner_application_id,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            status: parse_column::<ApplicationStatus>("applications.status", &row.status)?,
            applied_at: row.applied_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SyncLogRow {
    id: i64,
    integration_id: i64,
    sync_type: String,
    status: String,
    records_processed: i32,
    records_failed: i32,
    error_message: Option<String>,
    metadata: serde_json::Value,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SyncLogRow> for SyncLog {
    type Error = DbError;

    fn try_from(row: SyncLogRow) -> Result<Self, Self::Error> {
        Ok(SyncLog {
            id: row.id,
            integration_id: row.integration_id,
            sync_type: parse_column::<SyncType>("partner_sync_logs.sync_type", &row.sync_type)?,
            status: parse_column::<SyncStatus>("partner_sync_logs.status", &row.status)?,
            records_processed: row.records_processed,
            records_failed: row.records_failed,
            error_message: row.error_message,
            metadata: row.metadata,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl PartnerStore for PgStore {
    async fn list_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError> {
        let rows = sqlx::query_as::<_, IntegrationRow>(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM partner_integrations \
             WHERE ($1::TEXT IS NULL OR partner = $1) \
             ORDER BY id"
        ))
        .bind(partner.map(PartnerKind::as_str))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_active_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError> {
        let rows = sqlx::query_as::<_, IntegrationRow>(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM partner_integrations \
             WHERE status = 'ACTIVE' AND ($1::TEXT IS NULL OR partner = $1) \
             ORDER BY id"
        ))
        .bind(partner.map(PartnerKind::as_str))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn upsert_integration(
        &self,
        partner: PartnerKind,
        status: IntegrationStatus,
        credentials: &PartnerCredentials,
        webhook_secret: Option<&str>,
    ) -> Result<PartnerIntegration, DbError> {
        let credentials = serde_json::to_value(credentials)?;
        let row = sqlx::query_as::<_, IntegrationRow>(&format!(
            "INSERT INTO partner_integrations (partner, status, credentials, webhook_secret) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (partner) DO UPDATE SET \
               status = EXCLUDED.status, \
               credentials = EXCLUDED.credentials, \
               webhook_secret = EXCLUDED.webhook_secret, \
               updated_at = NOW() \
             RETURNING {INTEGRATION_COLUMNS}"
        ))
        .bind(partner.as_str())
        .bind(status.as_str())
        .bind(&credentials)
        .bind(webhook_secret)
        .fetch_one(&self.pool)
        .await?;
        PartnerIntegration::try_from(row)
    }

    async fn update_integration_status(
        &self,
        id: i64,
        status: IntegrationStatus,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE partner_integrations \
             SET status = $2, last_sync_at = COALESCE($3, last_sync_at), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_integration_credentials(
        &self,
        id: i64,
        credentials: &PartnerCredentials,
    ) -> Result<(), DbError> {
        let credentials = serde_json::to_value(credentials)?;
        sqlx::query(
            "UPDATE partner_integrations SET credentials = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(&credentials)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_job_posting(
        &self,
        posting: &NewPartnerJobPosting,
    ) -> Result<PartnerJobPosting, DbError> {
        let row = sqlx::query_as::<_, PostingRow>(&format!(
            "INSERT INTO partner_job_postings \
               (integration_id, signal_id, partner_job_id, status, metadata, posted_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (integration_id, partner_job_id) DO UPDATE SET \
               signal_id = COALESCE(EXCLUDED.signal_id, partner_job_postings.signal_id), \
               status = EXCLUDED.status, \
               metadata = EXCLUDED.metadata, \
               posted_at = COALESCE(EXCLUDED.posted_at, partner_job_postings.posted_at), \
               updated_at = NOW() \
             RETURNING {POSTING_COLUMNS}"
        ))
        .bind(posting.integration_id)
        .bind(posting.signal_id)
        .bind(&posting.partner_job_id)
        .bind(posting.status.as_str())
        .bind(&posting.metadata)
        .bind(posting.posted_at)
        .fetch_one(&self.pool)
        .await?;
        PartnerJobPosting::try_from(row)
    }

    async fn find_job_posting(
        &self,
        integration_id: i64,
        partner_job_id: &str,
    ) -> Result<Option<PartnerJobPosting>, DbError> {
        let row = sqlx::query_as::<_, PostingRow>(&format!(
            "SELECT {POSTING_COLUMNS} FROM partner_job_postings \
             WHERE integration_id = $1 AND partner_job_id = $2"
        ))
        .bind(integration_id)
        .bind(partner_job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PartnerJobPosting::try_from).transpose()
    }

    async fn list_linked_postings(
        &self,
        integration_id: Option<i64>,
    ) -> Result<Vec<PartnerJobPosting>, DbError> {
        let rows = sqlx::query_as::<_, PostingRow>(&format!(
            "SELECT {POSTING_COLUMNS} FROM partner_job_postings \
             WHERE signal_id IS NOT NULL AND ($1::BIGINT IS NULL OR integration_id = $1) \
             ORDER BY id"
        ))
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn count_job_postings(&self, integration_id: i64) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM partner_job_postings WHERE integration_id = $1",
        )
        .bind(integration_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_posting_metadata(
        &self,
        id: i64,
        metadata: &serde_json::Value,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE partner_job_postings SET metadata = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_posting_status(
        &self,
        id: i64,
        status: PartnerJobStatus,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE partner_job_postings SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_application(
        &self,
        application: &NewApplication,
    ) -> Result<Option<Application>, DbError> {
        // The count update only sees a row when the insert produced one.
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "WITH inserted AS ( \
               INSERT INTO applications \
                 (posting_id, partner_application_id, candidate_name, candidate_email, status, applied_at) \
               VALUES ($1, $2, $3, $4, $5, $6) \
               ON CONFLICT (posting_id, partner_application_id) DO NOTHING \
               RETURNING {APPLICATION_COLUMNS} \
             ), bumped AS ( \
               UPDATE partner_job_postings \
               SET application_count = application_count + 1, updated_at = NOW() \
               WHERE id = (SELECT posting_id FROM inserted) \
             ) \
             SELECT {APPLICATION_COLUMNS} FROM inserted"
        ))
        .bind(application.posting_id)
        .bind(&application.partner_application_id)
        .bind(application.candidate_name.as_deref())
        .bind(application.candidate_email.as_deref())
        .bind(application.status.as_str())
        .bind(application.applied_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Application::try_from).transpose()
    }

    async fn update_application_status(
        &self,
        integration_id: i64,
        partner_application_id: &str,
        status: ApplicationStatus,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE applications AS a SET status = $3, updated_at = NOW() \
             FROM partner_job_postings AS p \
             WHERE a.posting_id = p.id \
               AND p.integration_id = $1 \
               AND a.partner_application_id = $2",
        )
        .bind(integration_id)
        .bind(partner_application_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_applications(&self, posting_id: i64) -> Result<Vec<Application>, DbError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE posting_id = $1 ORDER BY id"
        ))
        .bind(posting_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn insert_sync_log(&self, log: &NewSyncLog) -> Result<SyncLog, DbError> {
        let row = sqlx::query_as::<_, SyncLogRow>(&format!(
            "INSERT INTO partner_sync_logs \
               (integration_id, sync_type, status, records_processed, records_failed, \
                error_message, metadata, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             RETURNING {SYNC_LOG_COLUMNS}"
        ))
        .bind(log.integration_id)
        .bind(log.sync_type.as_str())
        .bind(log.status.as_str())
        .bind(log.records_processed)
        .bind(log.records_failed)
        .bind(log.error_message.as_deref())
        .bind(&log.metadata)
        .bind(log.started_at)
        .fetch_one(&self.pool)
        .await?;
        SyncLog::try_from(row)
    }

    async fn list_sync_logs(
        &self,
        integration_id: i64,
        limit: i64,
    ) -> Result<Vec<SyncLog>, DbError> {
        let rows = sqlx::query_as::<_, SyncLogRow>(&format!(
            "SELECT {SYNC_LOG_COLUMNS} FROM partner_sync_logs \
             WHERE integration_id = $1 \
             ORDER BY started_at DESC, id DESC \
             LIMIT $2"
        ))
        .bind(integration_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}
