use thiserror::Error;

/// One failed request attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
}

/// Raised once every retry for a URL has failed. Carries the last attempt's cause.
#[derive(Debug, Error)]
#[error("GET {url} failed after {attempts} attempts: {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: AttemptError,
}

/// The target table could not be validated; nothing has been written.
#[derive(Debug, Error)]
#[error("table {table} is not accessible: {reason}")]
pub struct StoreUnavailableError {
    pub table: String,
    pub reason: String,
}

/// Part of a batch could not be written. Logged and counted, never fatal.
#[derive(Debug, Error)]
#[error("{count} item(s) not written to {table}: {reason}")]
pub struct WriteFailure {
    pub table: String,
    pub count: usize,
    pub reason: String,
}
