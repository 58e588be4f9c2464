//! Statistics API client.
//!
//! Pulls the raw attempt records for the configured look-back window. The body
//! must be a JSON array; its elements are passed on untouched for validation.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::FetchError;

pub struct StatsClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl StatsClient {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub async fn fetch_attempts(&self) -> Result<Vec<Value>, FetchError> {
        let end = Utc::now();
        let query = window_query(&self.config, end)?;
        info!(url = %self.config.url, start = %query[2].1, end = %query[3].1, "requesting attempts");

        let response = self.http.get(&self.config.url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.bytes().await?;
        let records = decode_records(&body)?;
        info!(records = records.len(), "attempts received");
        Ok(records)
    }
}

fn window_query(
    config: &ApiConfig,
    end: DateTime<Utc>,
) -> Result<[(&'static str, String); 4], FetchError> {
    let start = TimeDelta::try_days(i64::from(config.days_back))
        .and_then(|window| end.checked_sub_signed(window))
        .ok_or(FetchError::InvalidWindow {
            days_back: config.days_back,
        })?;
    Ok([
        ("client", config.client.clone()),
        ("client_key", config.client_key.clone()),
        ("start", start.to_rfc3339()),
        ("end", end.to_rfc3339()),
    ])
}

fn decode_records(body: &[u8]) -> Result<Vec<Value>, FetchError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Err(FetchError::NotAnArray("an object")),
        Value::String(_) => Err(FetchError::NotAnArray("a string")),
        Value::Number(_) => Err(FetchError::NotAnArray("a number")),
        Value::Bool(_) => Err(FetchError::NotAnArray("a boolean")),
        Value::Null => Err(FetchError::NotAnArray("null")),
    }
}
