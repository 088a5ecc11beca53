use std::time::Duration;

use async_trait::async_trait;
use olympiad_core::model::SessionId;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::TimerConfig;
use crate::csrf::{CSRF_FORM_FIELD, CSRF_HEADER, CsrfToken};
use crate::error::ApiError;

const SESSION_FINISHED_CODE: &str = "session_finished";

//
// ─── CONTRACT ──────────────────────────────────────────────────────────────────
//

/// Server's answer to a progress query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressReport {
    Remaining(Duration),
    /// The session is already finished server-side.
    Closed,
}

/// Server-side operations the timer depends on.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Ask the server for the authoritative remaining time.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport failures or unexpected responses.
    async fn fetch_progress(&self, id: SessionId) -> Result<ProgressReport, ApiError>;

    /// Submit the finish action for the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the submission does not reach the server or is refused.
    async fn finish(&self, id: SessionId, csrf: Option<&CsrfToken>) -> Result<(), ApiError>;
}

//
// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────
//

/// Session-scoped routes under the platform base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// # Errors
    ///
    /// Returns `url::ParseError` if the route cannot be joined onto the base.
    pub fn progress(&self, id: SessionId) -> Result<Url, url::ParseError> {
        self.base.join(&format!("olympiads/{id}/update_progress/"))
    }

    /// # Errors
    ///
    /// Returns `url::ParseError` if the route cannot be joined onto the base.
    pub fn finish(&self, id: SessionId) -> Result<Url, url::ParseError> {
        self.base.join(&format!("olympiads/{id}/finish/"))
    }

    /// # Errors
    ///
    /// Returns `url::ParseError` if the route cannot be joined onto the base.
    pub fn results(&self, id: SessionId) -> Result<Url, url::ParseError> {
        self.base.join(&format!("olympiads/{id}/results/"))
    }
}

//
// ─── WIRE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
struct ProgressBody {
    status: ResponseStatus,
    #[serde(default, alias = "time_remaining")]
    remaining_seconds: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ProgressBody {
    fn is_finished(&self) -> bool {
        if self.code.as_deref() == Some(SESSION_FINISHED_CODE) {
            return true;
        }
        self.message.as_deref().is_some_and(|message| {
            let message = message.to_lowercase();
            message.contains("already finished") || message.contains("already completed")
        })
    }

    fn into_report(self) -> Result<ProgressReport, ApiError> {
        match self.status {
            ResponseStatus::Error if self.is_finished() => Ok(ProgressReport::Closed),
            ResponseStatus::Error => Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "unspecified error".into()),
            )),
            ResponseStatus::Success => {
                let secs = self.remaining_seconds.ok_or(ApiError::MissingRemaining)?;
                if secs.is_nan() {
                    return Err(ApiError::InvalidRemaining(secs));
                }
                Duration::try_from_secs_f64(secs.max(0.0))
                    .map(ProgressReport::Remaining)
                    .map_err(|_| ApiError::InvalidRemaining(secs))
            }
        }
    }
}

fn parse_progress(raw: &str) -> Option<Result<ProgressReport, ApiError>> {
    serde_json::from_str::<ProgressBody>(raw)
        .ok()
        .map(ProgressBody::into_report)
}

//
// ─── HTTP CLIENT ───────────────────────────────────────────────────────────────
//

/// `SessionApi` over the platform's HTTP routes.
#[derive(Clone)]
pub struct HttpSessionApi {
    client: Client,
    endpoints: Endpoints,
}

impl HttpSessionApi {
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &TimerConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            endpoints: Endpoints::new(config.base_url.clone()),
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn fetch_progress(&self, id: SessionId) -> Result<ProgressReport, ApiError> {
        let url = self.endpoints.progress(id)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(session = %id, %status, "progress response received");

        // Error statuses may still carry a structured "already finished" body.
        match parse_progress(&body) {
            Some(report) => report,
            None if !status.is_success() => Err(ApiError::HttpStatus(status)),
            None => Err(ApiError::MissingRemaining),
        }
    }

    async fn finish(&self, id: SessionId, csrf: Option<&CsrfToken>) -> Result<(), ApiError> {
        let url = self.endpoints.finish(id)?;
        let mut request = self.client.post(url);
        if let Some(token) = csrf {
            request = request
                .header(CSRF_HEADER, token.as_str())
                .form(&[(CSRF_FORM_FIELD, token.as_str())]);
        } else {
            request = request.form(&[("finish", "1")]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(ApiError::HttpStatus(status))
        }
    }
}
