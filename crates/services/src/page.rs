use std::time::Duration;

use chrono::{DateTime, Utc};
use olympiad_core::model::{Session, SessionId};
use olympiad_core::time::to_time_delta;
use serde::Deserialize;

use crate::csrf::CsrfToken;
use crate::error::PageError;

/// Data the host page embeds for the timer widget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageData {
    pub session_id: SessionId,
    /// Remaining time at page render, in minutes.
    #[serde(default)]
    pub remaining_minutes: Option<f64>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Value of the embedded `csrfmiddlewaretoken` field.
    #[serde(default)]
    pub csrf_token: Option<String>,
    /// Raw `Cookie` header visible to the page.
    #[serde(default)]
    pub cookie: Option<String>,
    /// Whether the page actually contains the timer mount.
    #[serde(default = "default_mounted")]
    pub timer_mounted: bool,
}

fn default_mounted() -> bool {
    true
}

impl PageData {
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            remaining_minutes: None,
            starts_at: None,
            ends_at: None,
            csrf_token: None,
            cookie: None,
            timer_mounted: true,
        }
    }

    /// # Errors
    ///
    /// Returns `PageError::Json` if the payload is not valid page data.
    pub fn from_json(raw: &str) -> Result<Self, PageError> {
        Ok(serde_json::from_str(raw)?)
    }

    #[must_use]
    pub fn with_remaining_minutes(mut self, minutes: f64) -> Self {
        self.remaining_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_window(mut self, starts_at: Option<DateTime<Utc>>, ends_at: DateTime<Utc>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = Some(ends_at);
        self
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<CsrfToken> {
        CsrfToken::resolve(self.csrf_token.as_deref(), self.cookie.as_deref())
    }

    /// Project the page data onto a session, using `now` for relative values.
    ///
    /// An absolute end timestamp takes precedence over the remaining minutes.
    ///
    /// # Errors
    ///
    /// Returns `PageError::MissingDeadline` when neither value is present,
    /// `PageError::InvalidRemaining` for negative or non-finite minutes, and
    /// session validation errors otherwise.
    pub fn session(&self, now: DateTime<Utc>) -> Result<Session, PageError> {
        if let Some(ends_at) = self.ends_at {
            let starts_at = self.starts_at.unwrap_or(now).min(ends_at);
            return Ok(Session::ending_at(self.session_id, starts_at, ends_at)?);
        }

        let minutes = self.remaining_minutes.ok_or(PageError::MissingDeadline)?;
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(PageError::InvalidRemaining(minutes));
        }
        let remaining = Duration::try_from_secs_f64(minutes * 60.0)
            .map_err(|_| PageError::InvalidRemaining(minutes))?;
        let ends_at = now
            .checked_add_signed(to_time_delta(remaining))
            .ok_or(PageError::InvalidRemaining(minutes))?;

        match self.starts_at {
            None if !remaining.is_zero() => {
                Ok(Session::with_time_limit(self.session_id, now, remaining)?)
            }
            starts_at => {
                let starts_at = starts_at.unwrap_or(now).min(ends_at);
                Ok(Session::ending_at(self.session_id, starts_at, ends_at)?)
            }
        }
    }
}
