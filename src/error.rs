use thiserror::Error;

/// Failures raised below the handler layer. Handlers translate these into
/// `(StatusCode, Json)` responses; external-data failures are expected to be
/// degraded to empty fallbacks before they ever reach a response.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("settings storage error: {0}")]
    Storage(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}
