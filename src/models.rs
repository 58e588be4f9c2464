use chrono::NaiveDate;
use serde::Serialize;

/// One validated attempt event, ready to be stored.
///
/// `(user_id, event_timestamp)` is the natural key used for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalAttempt {
    pub user_id: String,
    pub oauth_consumer_key: Option<String>,
    pub lis_result_sourcedid: Option<String>,
    pub lis_outcome_service_url: Option<String>,
    pub is_correct: Option<bool>,
    pub attempt_type: Option<String>,
    pub event_timestamp: String,
}

impl CanonicalAttempt {
    pub const COLUMNS: [&'static str; 7] = [
        "user_id",
        "oauth_consumer_key",
        "lis_result_sourcedid",
        "lis_outcome_service_url",
        "is_correct",
        "attempt_type",
        "event_timestamp",
    ];

    pub fn natural_key(&self) -> (&str, &str) {
        (&self.user_id, &self.event_timestamp)
    }
}

/// Raw counters for one calendar day, as read back from storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyCounts {
    pub total_attempts: i64,
    pub successful_attempts: i64,
    pub unique_users: i64,
    pub run_attempts: i64,
    pub check_attempts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub report_date: NaiveDate,
    pub total_attempts: i64,
    pub successful_attempts: i64,
    pub success_percentage: String,
    pub unique_users: i64,
    pub run_attempts: i64,
    pub check_attempts: i64,
}

/// Tally of one ingest pass through the writer.
///
/// `written()` counts every record whose insert statement succeeded, which
/// includes duplicates the store absorbed without creating a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl WriteSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.duplicates
    }
}
