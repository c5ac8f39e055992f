//! Two-layer duplicate filter in front of the signal store.
//!
//! The in-batch set saves store round-trips for postings repeated across
//! sources in one run. The store's natural-key constraint is authoritative
//! across concurrent runs.

use std::collections::HashSet;

use signalhub_core::{RawPosting, Signal};
use signalhub_db::{DbError, SignalStore, Store};

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub signals: Vec<Signal>,
    pub duplicates: usize,
}

/// Stores one posting unless its natural key is already taken.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails for a reason other than a duplicate.
pub async fn store_if_new(
    store: &dyn Store,
    posting: RawPosting,
) -> Result<Option<Signal>, DbError> {
    store.insert_signal_if_new(&posting.into_new_signal()).await
}

/// Deduplicates `postings` within the batch and against the store, storing
/// the survivors in order.
///
/// # Errors
///
/// Returns [`DbError`] on the first failed insert.
pub async fn dedupe_and_store(
    store: &dyn Store,
    postings: impl IntoIterator<Item = RawPosting>,
) -> Result<DedupOutcome, DbError> {
    let mut seen = HashSet::new();
    let mut outcome = DedupOutcome::default();
    for posting in postings {
        let key = posting.batch_key();
        if !seen.insert(key) {
            tracing::debug!(company = %posting.company_name, "duplicate within batch");
            outcome.duplicates += 1;
            continue;
        }
        let company = posting.company_name.clone();
        match store_if_new(store, posting).await? {
            Some(signal) => outcome.signals.push(signal),
            None => {
                tracing::debug!(company = %company, "signal already stored");
                outcome.duplicates += 1;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use signalhub_db::MemoryStore;

    use super::*;

    fn posting(title: &str, url: &str) -> RawPosting {
        RawPosting {
            source: "serpapi".to_string(),
            title: title.to_string(),
            company_name: "Acme".to_string(),
            company_url: None,
            job_url: Some(url.to_string()),
            location: Some("São Paulo, Brazil".to_string()),
            posted_date: None,
            description: None,
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn repeated_posting_in_batch_is_counted_once() {
        let store = MemoryStore::new();
        let batch = vec![
            posting("VP of Engineering", "https://jobs.example/1"),
            posting("VP of Engineering", "https://jobs.example/1"),
            posting("Head of Sales", "https://jobs.example/2"),
        ];

        let outcome = dedupe_and_store(&store, batch).await.unwrap();

        assert_eq!(outcome.signals.len(), 2);
        assert_eq!(outcome.duplicates, 1);
    }

    #[tokio::test]
    async fn store_rejects_same_url_with_new_title() {
        let store = MemoryStore::new();
        dedupe_and_store(&store, vec![posting("CTO", "https://jobs.example/9")])
            .await
            .unwrap();

        let renamed = posting("Chief Technology Officer", "https://jobs.example/9");
        let outcome = dedupe_and_store(&store, vec![renamed]).await.unwrap();

        assert!(outcome.signals.is_empty());
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(store.signals().len(), 1);
    }
}
