//! In-memory fakes for driving a `SessionTimer` without a browser or server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use olympiad_core::model::SessionId;
use url::Url;

use crate::api::{ProgressReport, SessionApi};
use crate::csrf::CsrfToken;
use crate::error::ApiError;
use crate::view::{TimerFrame, TimerView};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Report(ProgressReport),
    Failure,
}

/// A recorded finish submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishCall {
    pub session_id: SessionId,
    pub csrf: Option<String>,
}

/// Scripted `SessionApi`.
///
/// Progress answers are consumed in order; an empty script answers with a
/// rejection, which the timer logs and ignores.
#[derive(Debug, Default)]
pub struct FakeSessionApi {
    script: Mutex<VecDeque<Scripted>>,
    progress_delay: Mutex<Option<Duration>>,
    progress_calls: AtomicUsize,
    finish_failures: AtomicU32,
    finish_calls: Mutex<Vec<FinishCall>>,
}

impl FakeSessionApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_progress(&self, report: ProgressReport) {
        lock(&self.script).push_back(Scripted::Report(report));
    }

    pub fn push_failure(&self) {
        lock(&self.script).push_back(Scripted::Failure);
    }

    /// Delay every progress answer, to keep a request in flight.
    pub fn set_progress_delay(&self, delay: Duration) {
        *lock(&self.progress_delay) = Some(delay);
    }

    /// Make the next `times` finish submissions fail.
    pub fn fail_finish(&self, times: u32) {
        self.finish_failures.store(times, Ordering::SeqCst);
    }

    #[must_use]
    pub fn progress_calls(&self) -> usize {
        self.progress_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn finish_calls(&self) -> Vec<FinishCall> {
        lock(&self.finish_calls).clone()
    }
}

#[async_trait]
impl SessionApi for FakeSessionApi {
    async fn fetch_progress(&self, _id: SessionId) -> Result<ProgressReport, ApiError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.progress_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        match next {
            Some(Scripted::Report(report)) => Ok(report),
            Some(Scripted::Failure) => Err(ApiError::HttpStatus(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            )),
            None => Err(ApiError::Rejected("no scripted response".into())),
        }
    }

    async fn finish(&self, id: SessionId, csrf: Option<&CsrfToken>) -> Result<(), ApiError> {
        lock(&self.finish_calls).push(FinishCall {
            session_id: id,
            csrf: csrf.map(|token| token.as_str().to_string()),
        });
        let remaining_failures = self.finish_failures.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.finish_failures
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err(ApiError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY));
        }
        Ok(())
    }
}

/// `TimerView` that records everything it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingView {
    frames: Mutex<Vec<TimerFrame>>,
    messages: Mutex<Vec<String>>,
    navigations: Mutex<Vec<Url>>,
}

impl RecordingView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frames(&self) -> Vec<TimerFrame> {
        lock(&self.frames).clone()
    }

    #[must_use]
    pub fn last_frame(&self) -> Option<TimerFrame> {
        lock(&self.frames).last().cloned()
    }

    #[must_use]
    pub fn render_count(&self) -> usize {
        lock(&self.frames).len()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<Url> {
        lock(&self.navigations).clone()
    }
}

impl TimerView for RecordingView {
    fn render(&self, frame: &TimerFrame) {
        lock(&self.frames).push(frame.clone());
    }

    fn show_terminal_message(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }

    fn navigate(&self, url: &Url) {
        lock(&self.navigations).push(url.clone());
    }
}
