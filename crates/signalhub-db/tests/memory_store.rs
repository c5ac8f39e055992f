use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use signalhub_core::{
    ApplicationStatus, BucketType, IntegrationStatus, NewApplication, NewSignal,
    PartnerCredentials, PartnerJobStatus, PartnerKind, SignalType,
};
use signalhub_db::{
    BucketStore, CounterStore, JobStatus, JobStore, MemoryStore, NewJob, NewPartnerJobPosting,
    PartnerStore, RetentionPolicy, SignalStore,
};

fn job_signal(company: &str, url: Option<&str>) -> NewSignal {
    NewSignal {
        signal_type: SignalType::JobPosting,
        source: "serpapi".to_string(),
        title: Some("Head of Engineering".to_string()),
        company_name: company.to_string(),
        company_url: None,
        job_url: url.map(ToString::to_string),
        location: Some("Remote".to_string()),
        posted_date: None,
        raw_data: json!({"source": "test"}),
    }
}

fn funding_signal(company: &str, day: u32) -> NewSignal {
    NewSignal {
        signal_type: SignalType::FundingAnnouncement,
        source: "crunchbase".to_string(),
        title: Some("series_a round".to_string()),
        company_name: company.to_string(),
        company_url: None,
        job_url: None,
        location: None,
        posted_date: Some(Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap()),
        raw_data: json!({}),
    }
}

fn new_job(kind: &str, priority: i32) -> NewJob {
    NewJob {
        kind: kind.to_string(),
        payload: json!({}),
        priority,
        max_attempts: 3,
    }
}

#[tokio::test]
async fn duplicate_job_posting_is_rejected_by_natural_key() {
    let store = MemoryStore::new();

    let first = store
        .insert_signal_if_new(&job_signal("Acme", Some("https://jobs/1")))
        .await
        .unwrap();
    let again = store
        .insert_signal_if_new(&job_signal("Acme", Some("https://jobs/1")))
        .await
        .unwrap();
    let other_url = store
        .insert_signal_if_new(&job_signal("Acme", Some("https://jobs/2")))
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(again.is_none());
    assert!(other_url.is_some());
    assert_eq!(store.signals().len(), 2);
}

#[tokio::test]
async fn funding_signals_dedup_on_announcement_date() {
    let store = MemoryStore::new();

    assert!(store
        .insert_signal_if_new(&funding_signal("Acme", 1))
        .await
        .unwrap()
        .is_some());
    assert!(store
        .insert_signal_if_new(&funding_signal("Acme", 1))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .insert_signal_if_new(&funding_signal("Acme", 2))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn assignment_upsert_overwrites_confidence() {
    let store = MemoryStore::new();
    let signal = store
        .insert_signal_if_new(&job_signal("Acme", Some("https://jobs/1")))
        .await
        .unwrap()
        .unwrap();
    let bucket = store.ensure_bucket(BucketType::Poach).await.unwrap();
    let same_bucket = store.ensure_bucket(BucketType::Poach).await.unwrap();
    assert_eq!(bucket.id, same_bucket.id);

    let first = store
        .upsert_assignment(bucket.id, signal.id, 0.8)
        .await
        .unwrap();
    let second = store
        .upsert_assignment(bucket.id, signal.id, 0.6)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let listed = store
        .get_bucket_with_signals(bucket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(listed.signals.len(), 1);
    assert!((listed.signals[0].confidence - 0.6).abs() < f64::EPSILON);
}

#[tokio::test]
async fn buckets_are_listed_by_descending_priority() {
    let store = MemoryStore::new();
    store.ensure_bucket(BucketType::Poach).await.unwrap();
    store.ensure_bucket(BucketType::FundingBoost).await.unwrap();
    store.ensure_bucket(BucketType::Expansion).await.unwrap();

    let order: Vec<BucketType> = store
        .list_buckets_with_signals()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.bucket.bucket_type)
        .collect();

    assert_eq!(
        order,
        vec![
            BucketType::FundingBoost,
            BucketType::Expansion,
            BucketType::Poach
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn counter_resets_after_window() {
    let store = MemoryStore::new();
    let window = Duration::from_secs(60);

    assert_eq!(store.increment_counter("k", window).await.unwrap().count, 1);
    assert_eq!(store.increment_counter("k", window).await.unwrap().count, 2);

    tokio::time::advance(Duration::from_secs(30)).await;
    let mid = store.increment_counter("k", window).await.unwrap();
    assert_eq!(mid.count, 3);
    assert_eq!(mid.resets_in, Duration::from_secs(30));

    tokio::time::advance(Duration::from_secs(31)).await;
    let fresh = store.increment_counter("k", window).await.unwrap();
    assert_eq!(fresh.count, 1);
    assert_eq!(fresh.resets_in, window);
}

#[tokio::test]
async fn claim_prefers_lower_priority_number() {
    let store = MemoryStore::new();
    let scheduled = store.enqueue_job(&new_job("ingest", 2)).await.unwrap();
    let webhook = store.enqueue_job(&new_job("webhook", 1)).await.unwrap();

    let first = store.claim_next_job().await.unwrap().unwrap();
    let second = store.claim_next_job().await.unwrap().unwrap();

    assert_eq!(first.id, webhook.id);
    assert_eq!(first.status, JobStatus::Active);
    assert_eq!(first.attempts, 1);
    assert_eq!(second.id, scheduled.id);
    assert!(store.claim_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn delayed_retry_is_counted_separately() {
    let store = MemoryStore::new();
    let job = store.enqueue_job(&new_job("ingest", 2)).await.unwrap();
    store.claim_next_job().await.unwrap();
    store
        .retry_job(job.id, Utc::now() + chrono::Duration::hours(1), "boom")
        .await
        .unwrap();

    let counts = store.job_counts().await.unwrap();
    assert_eq!(counts.delayed, 1);
    assert_eq!(counts.waiting, 0);
    assert!(store.claim_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn prune_keeps_most_recent_completed_jobs() {
    let store = MemoryStore::new();
    for _ in 0..3 {
        let job = store.enqueue_job(&new_job("ingest", 2)).await.unwrap();
        store.claim_next_job().await.unwrap();
        store.complete_job(job.id, &json!({"ok": true})).await.unwrap();
    }
    let failed = store.enqueue_job(&new_job("ingest", 2)).await.unwrap();
    store.claim_next_job().await.unwrap();
    store.fail_job(failed.id, "gave up").await.unwrap();

    let policy = RetentionPolicy {
        completed_max_count: 1,
        ..RetentionPolicy::default()
    };
    let removed = store.prune_jobs(&policy).await.unwrap();

    assert_eq!(removed, 2);
    let counts = store.job_counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
}

#[tokio::test]
async fn posting_upsert_keeps_existing_signal_link() {
    let store = MemoryStore::new();
    let integration = store
        .upsert_integration(
            PartnerKind::Indeed,
            IntegrationStatus::Active,
            &PartnerCredentials::default(),
            None,
        )
        .await
        .unwrap();
    let linked = store
        .upsert_job_posting(&NewPartnerJobPosting {
            integration_id: integration.id,
            signal_id: Some(7),
            partner_job_id: "jk-1".to_string(),
            status: PartnerJobStatus::Posted,
            metadata: json!({"title": "CTO"}),
            posted_at: None,
        })
        .await
        .unwrap();

    let refreshed = store
        .upsert_job_posting(&NewPartnerJobPosting {
            integration_id: integration.id,
            signal_id: None,
            partner_job_id: "jk-1".to_string(),
            status: PartnerJobStatus::Closed,
            metadata: json!({"title": "CTO"}),
            posted_at: None,
        })
        .await
        .unwrap();

    assert_eq!(linked.id, refreshed.id);
    assert_eq!(refreshed.signal_id, Some(7));
    assert_eq!(refreshed.status, PartnerJobStatus::Closed);
    assert_eq!(store.count_job_postings(integration.id).await.unwrap(), 1);
}

async fn seed_posting(store: &MemoryStore, partner: PartnerKind, job_id: &str) -> (i64, i64) {
    let integration = store
        .upsert_integration(
            partner,
            IntegrationStatus::Active,
            &PartnerCredentials::default(),
            None,
        )
        .await
        .unwrap();
    let posting = store
        .upsert_job_posting(&NewPartnerJobPosting {
            integration_id: integration.id,
            signal_id: None,
            partner_job_id: job_id.to_string(),
            status: PartnerJobStatus::Posted,
            metadata: json!({}),
            posted_at: None,
        })
        .await
        .unwrap();
    (integration.id, posting.id)
}

fn application(posting_id: i64, partner_application_id: &str) -> NewApplication {
    NewApplication {
        posting_id,
        partner_application_id: partner_application_id.to_string(),
        candidate_name: Some("Ana".to_string()),
        candidate_email: None,
        status: ApplicationStatus::Applied,
        applied_at: None,
    }
}

#[tokio::test]
async fn repeated_application_is_recorded_and_counted_once() {
    let store = MemoryStore::new();
    let (integration_id, posting_id) = seed_posting(&store, PartnerKind::LinkedIn, "li-1").await;
    let new = application(posting_id, "app-1");

    let first = store.record_application(&new).await.unwrap();
    let second = store.record_application(&new).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    let posting = store
        .find_job_posting(integration_id, "li-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(posting.application_count, 1);
    assert_eq!(store.list_applications(posting_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn application_for_missing_posting_is_rejected() {
    let store = MemoryStore::new();
    assert!(store.record_application(&application(99, "app-1")).await.is_err());
}

#[tokio::test]
async fn status_update_is_scoped_to_the_integration() {
    let store = MemoryStore::new();
    let (linkedin_id, linkedin_posting) =
        seed_posting(&store, PartnerKind::LinkedIn, "li-1").await;
    let (indeed_id, indeed_posting) = seed_posting(&store, PartnerKind::Indeed, "jk-1").await;
    store
        .record_application(&application(linkedin_posting, "app-1"))
        .await
        .unwrap();
    store
        .record_application(&application(indeed_posting, "app-1"))
        .await
        .unwrap();

    let updated = store
        .update_application_status(indeed_id, "app-1", ApplicationStatus::Rejected)
        .await
        .unwrap();

    assert_eq!(updated, 1);
    assert_eq!(
        store.list_applications(indeed_posting).await.unwrap()[0].status,
        ApplicationStatus::Rejected
    );
    assert_eq!(
        store.list_applications(linkedin_posting).await.unwrap()[0].status,
        ApplicationStatus::Applied
    );
    assert_ne!(linkedin_id, indeed_id);
}

#[tokio::test]
async fn signals_page_newest_first_with_type_filter() {
    let store = MemoryStore::new();
    for (i, company) in ["Acme", "Beta", "Cora"].iter().enumerate() {
        store
            .insert_signal_if_new(&job_signal(company, Some(&format!("https://jobs/{i}"))))
            .await
            .expect("insert job");
    }
    store
        .insert_signal_if_new(&funding_signal("Delta", 3))
        .await
        .expect("insert funding");

    let names = |signals: Vec<signalhub_core::Signal>| {
        signals
            .into_iter()
            .map(|s| s.company_name)
            .collect::<Vec<_>>()
    };

    let first = store.list_signals(None, 2, 0).await.expect("page 1");
    assert_eq!(names(first), ["Delta", "Cora"]);

    let jobs = store
        .list_signals(Some(SignalType::JobPosting), 10, 1)
        .await
        .expect("jobs");
    assert_eq!(names(jobs), ["Beta", "Acme"]);

    assert!(store
        .list_signals(None, 10, 10)
        .await
        .expect("past the end")
        .is_empty());
}
