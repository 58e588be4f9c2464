use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::Rejection;
use crate::models::CanonicalAttempt;
use crate::passback;

/// Result of folding a raw batch through [`normalize`].
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub accepted: Vec<CanonicalAttempt>,
    pub rejected: Vec<(usize, Rejection)>,
}

/// Validate one raw record and map it onto the canonical shape.
///
/// Fields are checked in a fixed order and the first failure rejects the
/// whole record. Passback sub-fields degrade to absent when the blob cannot
/// be decoded; a sub-field that decodes to a non-string still rejects.
pub fn normalize(raw: &Value) -> Result<CanonicalAttempt, Rejection> {
    let record = raw
        .as_object()
        .ok_or_else(|| Rejection::NotAnObject(raw.clone()))?;
    let passback = passback::decode(record.get("passback_params"));

    let user_id = required_string(record, "lti_user_id")?;
    let oauth_consumer_key = optional_string(&passback, "oauth_consumer_key")?;
    let lis_result_sourcedid = optional_string(&passback, "lis_result_sourcedid")?;
    let lis_outcome_service_url = optional_string(&passback, "lis_outcome_service_url")?;
    let attempt_type = optional_string(record, "attempt_type")?;
    let event_timestamp = required_string(record, "created_at")?;
    let is_correct = record.get("is_correct").and_then(coerce_bool);

    Ok(CanonicalAttempt {
        user_id,
        oauth_consumer_key,
        lis_result_sourcedid,
        lis_outcome_service_url,
        is_correct,
        attempt_type,
        event_timestamp,
    })
}

/// Normalize every record, logging each rejection with its source record.
pub fn normalize_batch(raw: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, record) in raw.iter().enumerate() {
        match normalize(record) {
            Ok(attempt) => batch.accepted.push(attempt),
            Err(rejection) => {
                warn!(index, %rejection, %record, "record skipped");
                batch.rejected.push((index, rejection));
            }
        }
    }

    info!(
        received = raw.len(),
        accepted = batch.accepted.len(),
        rejected = batch.rejected.len(),
        "records normalized"
    );
    batch
}

fn required_string(record: &Map<String, Value>, key: &'static str) -> Result<String, Rejection> {
    match record.get(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        other => Err(Rejection::invalid(key, other)),
    }
}

fn optional_string(
    record: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, Rejection> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        other => Err(Rejection::invalid(key, other)),
    }
}

/// Truthiness for `is_correct`. Null stays absent rather than becoming false.
fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => Some(number.as_f64().map_or(true, |n| n != 0.0)),
        Value::String(text) => {
            let text = text.trim().to_ascii_lowercase();
            Some(!matches!(
                text.as_str(),
                "" | "false" | "0" | "no" | "n" | "f" | "off" | "none" | "null"
            ))
        }
        Value::Array(items) => Some(!items.is_empty()),
        Value::Object(map) => Some(!map.is_empty()),
    }
}
