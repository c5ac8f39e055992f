use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerKind {
    #[serde(rename = "LINKEDIN")]
    LinkedIn,
    Indeed,
    Glassdoor,
}

wire_enum!(PartnerKind, "partner", {
    LinkedIn => "LINKEDIN",
    Indeed => "INDEED",
    Glassdoor => "GLASSDOOR",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationStatus {
    Pending,
    Active,
    Suspended,
    Error,
}

wire_enum!(IntegrationStatus, "integration status", {
    Pending => "PENDING",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Error => "ERROR",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerJobStatus {
    Draft,
    Posted,
    Paused,
    Closed,
    Expired,
    Deleted,
}

wire_enum!(PartnerJobStatus, "partner job status", {
    Draft => "DRAFT",
    Posted => "POSTED",
    Paused => "PAUSED",
    Closed => "CLOSED",
    Expired => "EXPIRED",
    Deleted => "DELETED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Applied,
    Reviewing,
    Screening,
    Interviewing,
    Offered,
    Accepted,
    Rejected,
    Withdrawn,
}

wire_enum!(ApplicationStatus, "application status", {
    Applied => "APPLIED",
    Reviewing => "REVIEWING",
    Screening => "SCREENING",
    Interviewing => "INTERVIEWING",
    Offered => "OFFERED",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Pull,
    Push,
    ConflictResolution,
    Webhook,
}

wire_enum!(SyncType, "sync type", {
    Pull => "pull",
    Push => "push",
    ConflictResolution => "conflict_resolution",
    Webhook => "webhook",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
    Partial,
}

wire_enum!(SyncStatus, "sync status", {
    Success => "success",
    Error => "error",
    Partial => "partial",
});

impl SyncStatus {
    /// Status of a batch run from its processed/failed counts.
    #[must_use]
    pub fn from_counts(processed: i32, failed: i32) -> Self {
        match (processed, failed) {
            (_, 0) => SyncStatus::Success,
            (0, _) => SyncStatus::Error,
            _ => SyncStatus::Partial,
        }
    }
}

/// How `bidirectional_sync` settles a signal and its partner copy disagreeing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Ours,
    Theirs,
    #[default]
    Newest,
}

wire_enum!(ConflictStrategy, "conflict strategy", {
    Ours => "ours",
    Theirs => "theirs",
    Newest => "newest",
});

/// Per-partner secrets stored alongside the integration row.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub partner_id: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for PartnerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("PartnerCredentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("partner_id", &self.partner_id)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerIntegration {
    pub id: i64,
    pub partner: PartnerKind,
    pub status: IntegrationStatus,
    #[serde(skip_serializing, default)]
    pub credentials: PartnerCredentials,
    #[serde(skip_serializing, default)]
    pub webhook_secret: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerJobPosting {
    pub id: i64,
    pub integration_id: i64,
    pub signal_id: Option<i64>,
    pub partner_job_id: String,
    pub status: PartnerJobStatus,
    pub metadata: serde_json::Value,
    pub application_count: i32,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartnerJobPosting {
    /// The partner's view of the posting title, if cached.
    #[must_use]
    pub fn metadata_title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(serde_json::Value::as_str)
    }

    /// The partner's view of the posting location, if cached.
    #[must_use]
    pub fn metadata_location(&self) -> Option<&str> {
        self.metadata
            .get("location")
            .and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub integration_id: i64,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub records_processed: i32,
    pub records_failed: i32,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLog {
    pub integration_id: i64,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub records_processed: i32,
    pub records_failed: i32,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub posting_id: i64,
    pub partner_application_id: String,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub posting_id: i64,
    pub partner_application_id: String,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_kind_accepts_lowercase_names() {
        assert_eq!("linkedin".parse::<PartnerKind>().unwrap(), PartnerKind::LinkedIn);
        assert_eq!("Indeed".parse::<PartnerKind>().unwrap(), PartnerKind::Indeed);
        assert!("monster".parse::<PartnerKind>().is_err());
    }

    #[test]
    fn partner_kind_serializes_screaming_case() {
        let json = serde_json::to_string(&PartnerKind::LinkedIn).unwrap();
        assert_eq!(json, "\"LINKEDIN\"");
    }

    #[test]
    fn sync_status_from_counts() {
        assert_eq!(SyncStatus::from_counts(3, 0), SyncStatus::Success);
        assert_eq!(SyncStatus::from_counts(0, 0), SyncStatus::Success);
        assert_eq!(SyncStatus::from_counts(0, 2), SyncStatus::Error);
        assert_eq!(SyncStatus::from_counts(4, 1), SyncStatus::Partial);
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = PartnerCredentials {
            access_token: Some("tok".to_string()),
            client_secret: Some("shh".to_string()),
            client_id: Some("app-1".to_string()),
            ..PartnerCredentials::default()
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("tok\""));
        assert!(!debug.contains("shh"));
        assert!(debug.contains("app-1"));
    }

    #[test]
    fn posting_metadata_accessors() {
        let posting = PartnerJobPosting {
            id: 1,
            integration_id: 1,
            signal_id: None,
            partner_job_id: "abc".to_string(),
            status: PartnerJobStatus::Posted,
            metadata: serde_json::json!({ "title": "CTO", "location": "Remote" }),
            application_count: 0,
            posted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(posting.metadata_title(), Some("CTO"));
        assert_eq!(posting.metadata_location(), Some("Remote"));
    }
}
