//! Error types shared by the accumulator and the shutdown outputs.
//!
//! Message errors are never fatal: the subscriber logs them and drops the
//! offending payload. Output errors are logged once at shutdown.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Field '{field}' is not a finite number: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chart rendering failed: {0}")]
    Chart(String),
}

/// Convenience alias for results using the monitor error type.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
