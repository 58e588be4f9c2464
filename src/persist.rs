use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::models::{CanonicalAttempt, WriteSummary};
use crate::store::{AttemptBatch, AttemptStore, InsertOutcome};

/// Write a batch of attempts, ignoring rows whose natural key already exists.
///
/// Per-record failures are logged and skipped. Only a failure to connect (or
/// to commit the batch) is returned as an error, in which case nothing from
/// this batch is stored.
pub async fn persist<S: AttemptStore>(
    store: &S,
    attempts: &[CanonicalAttempt],
) -> Result<WriteSummary, StoreError> {
    let mut summary = WriteSummary::default();
    if attempts.is_empty() {
        warn!("no records to write");
        return Ok(summary);
    }

    let mut batch = store.open_batch().await.map_err(|err| {
        error!(error = %err, "could not open database batch");
        err
    })?;

    for attempt in attempts {
        match batch.insert(attempt).await {
            Ok(InsertOutcome::Inserted) => summary.inserted += 1,
            Ok(InsertOutcome::Duplicate) => summary.duplicates += 1,
            Err(err) => {
                let (user_id, event_timestamp) = attempt.natural_key();
                warn!(
                    error = %err,
                    user_id,
                    event_timestamp,
                    record = ?attempt,
                    "insert failed, record skipped"
                );
                summary.failed += 1;
            }
        }
    }

    batch.commit().await.map_err(|err| {
        error!(error = %err, "batch commit failed");
        err
    })?;

    info!(
        written = summary.written(),
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "records written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn attempt(user_id: &str, event_timestamp: &str) -> CanonicalAttempt {
        CanonicalAttempt {
            user_id: user_id.to_string(),
            oauth_consumer_key: Some("k1".to_string()),
            lis_result_sourcedid: None,
            lis_outcome_service_url: None,
            is_correct: Some(true),
            attempt_type: Some("run".to_string()),
            event_timestamp: event_timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryStore {
            refuse_connections: true,
            ..MemoryStore::default()
        };
        let summary = persist(&store, &[]).await.unwrap();
        assert_eq!(summary.written(), 0);
    }

    #[tokio::test]
    async fn writing_the_same_record_twice_stores_one_row() {
        let store = MemoryStore::default();
        let records = vec![attempt("u1", "2024-01-01T00:00:00Z")];

        let first = persist(&store, &records).await.unwrap();
        let second = persist(&store, &records).await.unwrap();

        assert_eq!(first.written(), 1);
        assert_eq!(first.inserted, 1);
        assert_eq!(second.written(), 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_keep_the_first_row() {
        let store = MemoryStore::default();
        let mut later = attempt("u1", "2024-01-01T00:00:00Z");
        later.is_correct = Some(false);
        let records = vec![attempt("u1", "2024-01-01T00:00:00Z"), later];

        let summary = persist(&store, &records).await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(store.rows()[0].is_correct, Some(true));
    }

    #[tokio::test]
    async fn failing_record_does_not_abort_the_batch() {
        let store = MemoryStore {
            failing_users: ["bad".to_string()].into_iter().collect(),
            ..MemoryStore::default()
        };
        let records = vec![
            attempt("u1", "2024-01-01T00:00:00Z"),
            attempt("bad", "2024-01-01T00:00:01Z"),
            attempt("u2", "2024-01-01T00:00:02Z"),
        ];

        let summary = persist(&store, &records).await.unwrap();

        assert_eq!(summary.written(), 2);
        assert_eq!(summary.failed, 1);
        let users: Vec<String> = store.rows().into_iter().map(|row| row.user_id).collect();
        assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn connection_failure_writes_nothing() {
        let store = MemoryStore {
            refuse_connections: true,
            ..MemoryStore::default()
        };
        let err = persist(&store, &[attempt("u1", "2024-01-01T00:00:00Z")])
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert!(store.rows().is_empty());
    }
}
