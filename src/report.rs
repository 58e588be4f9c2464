use std::fmt::Write;

use chrono::{FixedOffset, Local, NaiveDate, TimeZone};
use tracing::{error, info};

use crate::error::StoreError;
use crate::models::{DailyCounts, DailyReport};
use crate::store::AttemptStore;

pub const ZERO_PERCENTAGE: &str = "0.00%";

/// Share of successful attempts, rounded half-up to two decimals, e.g. `"60.00%"`.
pub fn success_percentage(successful: i64, total: i64) -> String {
    if total <= 0 {
        return ZERO_PERCENTAGE.to_string();
    }
    let successful = successful.clamp(0, total) as i128;
    let total = total as i128;
    let hundredths = (successful * 20_000 + total) / (2 * total);
    format!("{}.{:02}%", hundredths / 100, hundredths % 100)
}

impl DailyReport {
    pub fn empty(report_date: NaiveDate) -> Self {
        DailyReport {
            report_date,
            total_attempts: 0,
            successful_attempts: 0,
            success_percentage: ZERO_PERCENTAGE.to_string(),
            unique_users: 0,
            run_attempts: 0,
            check_attempts: 0,
        }
    }

    /// A zero total always yields the all-zero report, whatever the other counters say.
    pub fn from_counts(report_date: NaiveDate, counts: DailyCounts) -> Self {
        if counts.total_attempts <= 0 {
            return Self::empty(report_date);
        }

        DailyReport {
            report_date,
            total_attempts: counts.total_attempts,
            successful_attempts: counts.successful_attempts,
            success_percentage: success_percentage(
                counts.successful_attempts,
                counts.total_attempts,
            ),
            unique_users: counts.unique_users,
            run_attempts: counts.run_attempts,
            check_attempts: counts.check_attempts,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_attempts > 0
    }

    /// `(label, value)` pairs in display order.
    pub fn metrics(&self) -> [(&'static str, String); 7] {
        [
            ("Report date", self.report_date.format("%Y-%m-%d").to_string()),
            ("Total attempts", self.total_attempts.to_string()),
            ("Successful attempts", self.successful_attempts.to_string()),
            ("Success percentage", self.success_percentage.clone()),
            ("Unique users", self.unique_users.to_string()),
            ("Attempts of type 'run'", self.run_attempts.to_string()),
            ("Attempts of type 'check'", self.check_attempts.to_string()),
        ]
    }
}

/// UTC offset of the process time zone at midday on `date`.
pub fn local_offset(date: NaiveDate) -> FixedOffset {
    date.and_hms_opt(12, 0, 0)
        .and_then(|noon| Local.from_local_datetime(&noon).earliest())
        .map_or_else(|| *Local::now().offset(), |noon| *noon.offset())
}

/// Aggregate `report_date` as a calendar day in the process time zone.
pub async fn aggregate_on<S: AttemptStore>(
    store: &S,
    report_date: NaiveDate,
) -> Result<DailyReport, StoreError> {
    aggregate_at(store, report_date, local_offset(report_date)).await
}

pub async fn aggregate_at<S: AttemptStore>(
    store: &S,
    report_date: NaiveDate,
    offset: FixedOffset,
) -> Result<DailyReport, StoreError> {
    let counts = store.daily_counts(report_date, offset).await.map_err(|err| {
        error!(error = %err, %report_date, %offset, "daily aggregation failed");
        err
    })?;
    let report = DailyReport::from_counts(report_date, counts);

    if report.has_data() {
        info!(
            %report_date,
            total = report.total_attempts,
            success = %report.success_percentage,
            "daily report computed"
        );
    } else {
        info!(%report_date, "no attempts recorded for the report date");
    }
    Ok(report)
}

pub async fn aggregate_today<S: AttemptStore>(store: &S) -> Result<DailyReport, StoreError> {
    aggregate_on(store, Local::now().date_naive()).await
}

pub fn render_text(report: &DailyReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Attempt Report");
    let _ = writeln!(output);
    if !report.has_data() {
        let _ = writeln!(output, "No attempts recorded for this date.");
        let _ = writeln!(output);
    }
    for (label, value) in report.metrics() {
        let _ = writeln!(output, "- {label}: {value}");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalAttempt;
    use crate::store::memory::MemoryStore;

    fn attempt(user: &str, at: String, correct: Option<bool>, kind: &str) -> CanonicalAttempt {
        CanonicalAttempt {
            user_id: user.to_string(),
            oauth_consumer_key: None,
            lis_result_sourcedid: None,
            lis_outcome_service_url: None,
            is_correct: correct,
            attempt_type: Some(kind.to_string()),
            event_timestamp: at,
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(success_percentage(6, 10), "60.00%");
        assert_eq!(success_percentage(1, 3), "33.33%");
        assert_eq!(success_percentage(2, 3), "66.67%");
        assert_eq!(success_percentage(1, 160), "0.63%");
        assert_eq!(success_percentage(10, 10), "100.00%");
        assert_eq!(success_percentage(0, 7), "0.00%");
        assert_eq!(success_percentage(0, 0), "0.00%");
    }

    #[test]
    fn zero_total_yields_zero_report() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let report = DailyReport::from_counts(
            date,
            DailyCounts {
                total_attempts: 0,
                unique_users: 4,
                ..DailyCounts::default()
            },
        );
        assert_eq!(report, DailyReport::empty(date));
        assert_eq!(report.success_percentage, "0.00%");
        assert_eq!(report.unique_users, 0);
    }

    #[tokio::test]
    async fn aggregates_todays_rows_only() {
        let today = Local::now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        let users = ["u1", "u2", "u3"];
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(attempt(
                users[i % 3],
                format!("{today}T10:00:{i:02}"),
                Some(i < 6),
                if i < 4 { "run" } else { "check" },
            ));
        }
        rows.push(attempt("u9", format!("{yesterday}T23:00:00"), Some(true), "run"));
        let store = MemoryStore::with_rows(rows);

        let report = aggregate_today(&store).await.unwrap();

        assert_eq!(
            report,
            DailyReport {
                report_date: today,
                total_attempts: 10,
                successful_attempts: 6,
                success_percentage: "60.00%".to_string(),
                unique_users: 3,
                run_attempts: 4,
                check_attempts: 6,
            }
        );
        assert_eq!(aggregate_today(&store).await.unwrap(), report);
    }

    #[tokio::test]
    async fn empty_store_gives_zero_data_report() {
        let store = MemoryStore::default();
        let report = aggregate_today(&store).await.unwrap();
        assert_eq!(report.total_attempts, 0);
        assert_eq!(report.success_percentage, "0.00%");
        assert!(!report.has_data());
    }

    #[tokio::test]
    async fn query_failure_is_not_a_zero_report() {
        let store = MemoryStore {
            refuse_connections: true,
            ..MemoryStore::default()
        };
        assert!(aggregate_today(&store).await.is_err());
    }

    #[tokio::test]
    async fn day_boundary_follows_the_given_offset() {
        let late_utc = |user: &str| {
            attempt(user, "2024-03-05T22:30:00Z".to_string(), Some(true), "run")
        };
        let store = MemoryStore::with_rows(vec![late_utc("u1"), late_utc("u2")]);
        let march_5 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let march_6 = march_5.succ_opt().unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let moscow = FixedOffset::east_opt(3 * 3600).unwrap();

        let report = aggregate_at(&store, march_5, utc).await.unwrap();
        assert_eq!(report.total_attempts, 2);
        assert!(!aggregate_at(&store, march_6, utc).await.unwrap().has_data());

        assert!(!aggregate_at(&store, march_5, moscow).await.unwrap().has_data());
        let report = aggregate_at(&store, march_6, moscow).await.unwrap();
        assert_eq!(report.report_date, march_6);
        assert_eq!(report.unique_users, 2);
    }

    #[test]
    fn local_offset_matches_the_process_clock() {
        let now = Local::now();
        let offset = local_offset(now.date_naive());
        assert!(offset.local_minus_utc().abs() < 24 * 3600);
        assert_eq!(
            local_offset(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            *Local
                .with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
                .unwrap()
                .offset()
        );
    }

    #[test]
    fn renders_all_metrics() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let text = render_text(&DailyReport::empty(date));
        assert!(text.contains("No attempts recorded"));
        assert!(text.contains("- Report date: 2024-03-05"));
        assert!(text.contains("- Success percentage: 0.00%"));
        assert_eq!(text.lines().filter(|line| line.starts_with("- ")).count(), 7);
    }
}
