use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{ApiConfig, RunConfig};
use crate::fetch::StatsClient;
use crate::mirror::{self, Mirror};
use crate::models::{CanonicalAttempt, DailyReport, WriteSummary};
use crate::normalize;
use crate::notify;
use crate::persist;
use crate::report;
use crate::store::AttemptStore;

#[derive(Debug)]
pub struct IngestOutcome {
    pub accepted: Vec<CanonicalAttempt>,
    pub rejected: usize,
    /// `None` when nothing was written or the batch could not be written at all.
    pub written: Option<WriteSummary>,
}

/// Validate a raw batch and write what survives.
pub async fn ingest<S: AttemptStore>(store: &S, raw: &[Value]) -> IngestOutcome {
    let batch = normalize::normalize_batch(raw);
    let mut outcome = IngestOutcome {
        rejected: batch.rejected.len(),
        accepted: batch.accepted,
        written: None,
    };
    if outcome.accepted.is_empty() {
        warn!("no valid records to write");
        return outcome;
    }

    match persist::persist(store, &outcome.accepted).await {
        Ok(summary) => outcome.written = Some(summary),
        Err(err) if err.is_connection() => {
            error!(error = %err, "database unreachable, batch write aborted")
        }
        Err(err) => error!(error = %err, "batch write aborted"),
    }
    outcome
}

/// One scheduled run: fetch, validate, persist, mirror, aggregate, notify.
///
/// Every stage recovers from its own faults, including failing to set up the
/// API client or the mirror, so the report is always attempted.
pub async fn run<S: AttemptStore>(config: &RunConfig, store: &S) {
    let raw = fetch(&config.api).await;
    let sink = match Mirror::from_config(&config.mirror) {
        Ok(sink) => Some(sink),
        Err(err) => {
            error!(error = ?err, "mirror unavailable, mirroring skipped");
            None
        }
    };

    if raw.is_empty() {
        warn!("no attempts received from the API");
    } else {
        let outcome = ingest(store, &raw).await;
        info!(
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected,
            written = outcome.written.map_or(0, |summary| summary.written()),
            "ingest finished"
        );
        if let Some(sink) = sink.as_ref().filter(|_| !outcome.accepted.is_empty()) {
            let table = mirror::attempts_table(&outcome.accepted);
            if let Err(err) = sink.overwrite(&config.mirror.raw_worksheet, &table).await {
                error!(error = %err, "mirroring raw data failed");
            }
        }
    }

    publish(config, store, sink.as_ref()).await;
}

/// Run once with panics caught, so a defect in any stage is logged and the
/// caller still regains control. Returns `false` if the run panicked.
pub async fn run_guarded<S: AttemptStore>(config: &RunConfig, store: &S) -> bool {
    guarded(run(config, store)).await
}

async fn guarded<F: Future<Output = ()>>(stage: F) -> bool {
    match AssertUnwindSafe(stage).catch_unwind().await {
        Ok(()) => true,
        Err(payload) => {
            error!(panic = panic_message(payload.as_ref()), "run aborted by a panic");
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Raw records for the look-back window; any failure, including a client
/// that cannot be built, yields an empty batch.
async fn fetch(config: &ApiConfig) -> Vec<Value> {
    let client = match StatsClient::new(config) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "statistics API client unavailable");
            return Vec::new();
        }
    };
    match client.fetch_attempts().await {
        Ok(raw) => raw,
        Err(err) => {
            error!(error = %err, "fetching attempts failed");
            Vec::new()
        }
    }
}

/// Aggregate, mirror and email today's report. Returns the report if one was produced.
async fn publish<S: AttemptStore>(
    config: &RunConfig,
    store: &S,
    sink: Option<&Mirror>,
) -> Option<DailyReport> {
    let Some(report) = build_report(store).await else {
        warn!("no report produced, notification skipped");
        return None;
    };

    if let Some(sink) = sink {
        let table = mirror::report_table(&report);
        if let Err(err) = sink
            .overwrite(&config.mirror.report_worksheet, &table)
            .await
        {
            error!(error = %err, "mirroring daily report failed");
        }
    }

    if let Err(err) = notify::send_report(&config.email, &report, &config.mirror.link()).await {
        error!(error = %err, "sending notification failed");
    }
    Some(report)
}

/// `None` means the aggregation itself failed, as opposed to a zero-data report.
async fn build_report<S: AttemptStore>(store: &S) -> Option<DailyReport> {
    match report::aggregate_today(store).await {
        Ok(report) => {
            info!(
                report_date = %report.report_date,
                total = report.total_attempts,
                "daily report ready"
            );
            Some(report)
        }
        Err(_) => None,
    }
}
