#![allow(async_fn_in_trait)]

use chrono::{FixedOffset, NaiveDate};

use crate::error::StoreError;
use crate::models::{CanonicalAttempt, DailyCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Durable storage for canonical attempts, unique on the natural key.
pub trait AttemptStore {
    type Batch<'a>: AttemptBatch
    where
        Self: 'a;

    /// Establish a connection and open one unit of work for a whole batch.
    async fn open_batch(&self) -> Result<Self::Batch<'_>, StoreError>;

    /// Read-only counters over every stored attempt whose timestamp, seen at
    /// UTC offset `offset`, falls on `date`.
    async fn daily_counts(
        &self,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<DailyCounts, StoreError>;
}

pub trait AttemptBatch {
    /// Insert one attempt. A failure must leave earlier inserts in the batch intact.
    async fn insert(&mut self, attempt: &CanonicalAttempt) -> Result<InsertOutcome, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
