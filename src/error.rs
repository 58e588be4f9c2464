use serde_json::Value;
use thiserror::Error;

/// Why a raw record could not become a canonical attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("record is not an object: {0}")]
    NotAnObject(Value),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: Value },
}

impl Rejection {
    pub fn invalid(field: &'static str, value: Option<&Value>) -> Self {
        Rejection::InvalidField {
            field,
            value: value.cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("statement failed: {0}")]
    Statement(#[source] sqlx::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connect(_))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to statistics API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("statistics API answered {status}")]
    Status { status: reqwest::StatusCode },

    #[error("statistics API returned undecodable body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("statistics API returned {0} instead of an array")]
    NotAnArray(&'static str),

    #[error("a look-back window of {days_back} days is out of range")]
    InvalidWindow { days_back: u32 },
}
