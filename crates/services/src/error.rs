//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

/// Errors emitted while building a `TimerConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid base url {raw:?}: {source}")]
    InvalidUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("grace delay {0:?} is outside 3..=5 seconds")]
    GraceOutOfRange(Duration),
    #[error("finish attempts must be at least one")]
    ZeroAttempts,
    #[error("invalid value for {key}: {raw:?}")]
    InvalidNumber { key: &'static str, raw: String },
}

/// Errors emitted while reading the host page's embedded data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageError {
    #[error("page data has neither a remaining time nor an end timestamp")]
    MissingDeadline,
    #[error("remaining minutes must be a finite, non-negative number (got {0})")]
    InvalidRemaining(f64),
    #[error(transparent)]
    Core(#[from] olympiad_core::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<olympiad_core::model::SessionError> for PageError {
    fn from(err: olympiad_core::model::SessionError) -> Self {
        Self::Core(err.into())
    }
}

/// Errors emitted by `SessionApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("session request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("server rejected the request: {0}")]
    Rejected(String),
    #[error("progress response has no remaining time")]
    MissingRemaining,
    #[error("progress response has an unusable remaining time ({0})")]
    InvalidRemaining(f64),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
