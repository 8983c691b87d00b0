pub mod endpoints;
pub mod logs;
pub mod secrets;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub use endpoints::EndpointStore;
pub use logs::LogStore;
pub use secrets::{PassthroughSecrets, SecretBox, SecretError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Secret(#[from] SecretError),
}

pub(crate) fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_utc(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Parse(format!("invalid {field}: {err}")))
}

/// Month partition a log row created at `dt` belongs to, e.g. `2024-05`.
pub(crate) fn partition_month(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m").to_string()
}
