use std::time::Duration;

use anyhow::Context;
use chrono::{FixedOffset, NaiveDate};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Row, Transaction};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{CanonicalAttempt, DailyCounts};
use crate::store::{AttemptBatch, AttemptStore, InsertOutcome};

const INSERT_ATTEMPT: &str = r#"
    INSERT INTO statistics (
        user_id,
        oauth_consumer_key,
        lis_result_sourcedid,
        lis_outcome_service_url,
        is_correct,
        attempt_type,
        event_timestamp
    ) VALUES ($1, $2, $3, $4, $5, $6, $7::timestamptz)
    ON CONFLICT (user_id, event_timestamp) DO NOTHING
"#;

/// `$2` is the UTC offset in seconds that decides which day a timestamp falls on.
const DAILY_COUNTS: &str = r#"
    SELECT
        COUNT(*) AS total_attempts,
        COUNT(*) FILTER (WHERE is_correct) AS successful_attempts,
        COUNT(DISTINCT user_id) AS unique_users,
        COUNT(*) FILTER (WHERE attempt_type = 'run') AS run_attempts,
        COUNT(*) FILTER (WHERE attempt_type = 'check') AS check_attempts
    FROM statistics
    WHERE (event_timestamp AT TIME ZONE make_interval(secs => $2))::date = $1
"#;

/// Postgres-backed attempt store.
///
/// The pool is lazy and holds at most one connection, so each writer or
/// aggregator call establishes its own connection and hands it back when the
/// call returns, on success or failure.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(60))
            .connect_lazy(database_url)
            .context("invalid DATABASE_URL")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("database pool closed");
    }
}

pub struct PgBatch {
    tx: Transaction<'static, Postgres>,
}

impl AttemptStore for PgStore {
    type Batch<'a> = PgBatch;

    async fn open_batch(&self) -> Result<Self::Batch<'_>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::Connect)?;
        debug!("database batch opened");
        Ok(PgBatch { tx })
    }

    async fn daily_counts(
        &self,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<DailyCounts, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Connect)?;
        let row = sqlx::query(DAILY_COUNTS)
            .bind(date)
            .bind(f64::from(offset.local_minus_utc()))
            .fetch_optional(&mut *conn)
            .await
            .map_err(StoreError::Statement)?;

        let Some(row) = row else {
            return Ok(DailyCounts::default());
        };
        let counts = DailyCounts {
            total_attempts: row.try_get("total_attempts").map_err(StoreError::Statement)?,
            successful_attempts: row
                .try_get("successful_attempts")
                .map_err(StoreError::Statement)?,
            unique_users: row.try_get("unique_users").map_err(StoreError::Statement)?,
            run_attempts: row.try_get("run_attempts").map_err(StoreError::Statement)?,
            check_attempts: row.try_get("check_attempts").map_err(StoreError::Statement)?,
        };
        debug!(%date, %offset, ?counts, "daily counts read");
        Ok(counts)
    }
}

impl AttemptBatch for PgBatch {
    /// Each insert runs inside its own savepoint so a failing row only rolls
    /// back itself.
    async fn insert(&mut self, attempt: &CanonicalAttempt) -> Result<InsertOutcome, StoreError> {
        let mut savepoint = Connection::begin(&mut *self.tx)
            .await
            .map_err(StoreError::Statement)?;
        let result = sqlx::query(INSERT_ATTEMPT)
            .bind(&attempt.user_id)
            .bind(&attempt.oauth_consumer_key)
            .bind(&attempt.lis_result_sourcedid)
            .bind(&attempt.lis_outcome_service_url)
            .bind(attempt.is_correct)
            .bind(&attempt.attempt_type)
            .bind(&attempt.event_timestamp)
            .execute(&mut *savepoint)
            .await;

        match result {
            Ok(done) => {
                savepoint.commit().await.map_err(StoreError::Statement)?;
                Ok(if done.rows_affected() > 0 {
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Duplicate
                })
            }
            Err(err) => {
                if let Err(rollback) = savepoint.rollback().await {
                    warn!(error = %rollback, "savepoint rollback failed");
                }
                Err(StoreError::Statement(err))
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::Commit)?;
        info!("database batch committed");
        Ok(())
    }
}
