//! Countdown client for a timed olympiad session.
//!
//! A [`SessionTimer`] owns its state and runs three kinds of tokio tasks:
//! a per-second tick, a slower reconciliation against the server, and a
//! one-shot termination that submits the session after a grace delay.
//! All of them stop on [`SessionTimer::dispose`].

mod inner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use olympiad_core::model::{Session, SessionId};
use olympiad_core::{Clock, Drift, TerminationCause, TimerState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{Endpoints, ProgressReport, SessionApi};
use crate::config::TimerConfig;
use crate::csrf::CsrfToken;
use crate::error::PageError;
use crate::page::PageData;
use crate::view::TimerView;

use inner::{TickEvent, TimerInner};

pub const MESSAGE_TIME_UP: &str = "Time is up. Your answers are being submitted...";
pub const MESSAGE_CLOSED: &str =
    "This olympiad session has already finished. Your answers are being submitted...";

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Why a reconciliation did not talk to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another progress request has not returned yet.
    InFlight,
    /// The timer is no longer counting down.
    NotRunning,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Skipped(SkipReason),
    /// Server answered while the session had not started; nothing to correct.
    NotStarted,
    Reconciled(Drift),
    /// Server reported the session closed and this pass started termination.
    Closed,
    /// Network or protocol failure; logged and ignored.
    Failed,
}

//
// ─── SHARED CONTEXT ────────────────────────────────────────────────────────────
//

struct Shared {
    session_id: SessionId,
    config: TimerConfig,
    endpoints: Endpoints,
    csrf: Option<CsrfToken>,
    api: Arc<dyn SessionApi>,
    view: Arc<dyn TimerView>,
    inner: Mutex<TimerInner>,
    /// Stops the tick and reconciliation schedules.
    schedule_tx: watch::Sender<bool>,
    /// Stops everything, including a pending termination.
    exit_tx: watch::Sender<bool>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    // A closed channel means the timer is gone; treat it as stopped.
    let _ = rx.wait_for(|stop| *stop).await;
}

impl Shared {
    fn spawn<F>(self: &Arc<Self>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn render(&self) {
        let frame = lock(&self.inner).frame();
        self.view.render(&frame);
    }

    /// Run the terminal path once the caller has won the expiry guard.
    fn begin_termination(self: &Arc<Self>, cause: TerminationCause) {
        self.schedule_tx.send_replace(true);
        self.render();
        let message = match cause {
            TerminationCause::ClosedByServer => MESSAGE_CLOSED,
            TerminationCause::Expired | TerminationCause::Disposed => MESSAGE_TIME_UP,
        };
        self.view.show_terminal_message(message);

        let shared = Arc::clone(self);
        let session_id = self.session_id;
        let exit_rx = self.exit_tx.subscribe();
        self.spawn(async move {
            tokio::select! {
                () = stopped(exit_rx) => {
                    debug!(session = %session_id, "termination cancelled by teardown");
                }
                () = shared.terminate() => {}
            }
        });
    }

    async fn terminate(self: Arc<Self>) {
        time::sleep(self.config.grace_delay).await;

        let attempts = self.config.finish_attempts.max(1);
        let mut submitted = false;
        for attempt in 1..=attempts {
            match self.api.finish(self.session_id, self.csrf.as_ref()).await {
                Ok(()) => {
                    info!(session = %self.session_id, attempt, "session submitted");
                    submitted = true;
                    break;
                }
                Err(err) if attempt < attempts => {
                    warn!(session = %self.session_id, attempt, "finish submission failed: {err}");
                    time::sleep(self.config.finish_retry_delay).await;
                }
                Err(err) => {
                    error!(
                        session = %self.session_id,
                        attempt,
                        "giving up on finish submission: {err}"
                    );
                }
            }
        }

        let finished = lock(&self.inner).state_mut().finish();
        if let Err(err) = finished {
            debug!(session = %self.session_id, "not navigating: {err}");
            return;
        }
        if !submitted {
            warn!(session = %self.session_id, "navigating to results without confirmed submission");
        }

        match self.endpoints.results(self.session_id) {
            Ok(url) => self.view.navigate(&url),
            Err(err) => error!(session = %self.session_id, "invalid results url: {err}"),
        }
    }

    async fn run_ticks(self: Arc<Self>, started: Instant) {
        let period = self.config.tick_interval;
        let mut interval = time::interval_at(started + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = started;

        loop {
            interval.tick().await;
            // A late tick must account for the whole delay, not one period.
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(last_tick);
            last_tick = now;

            let (event, frame) = {
                let mut inner = lock(&self.inner);
                let event = inner.tick(elapsed);
                (event, inner.frame())
            };

            match event {
                TickEvent::Continue => self.view.render(&frame),
                TickEvent::Expired => {
                    self.begin_termination(TerminationCause::Expired);
                    return;
                }
                TickEvent::Stopped => return,
            }
        }
    }

    async fn run_reconciliation(self: Arc<Self>, started: Instant) {
        let period = self.config.reconcile_interval;
        let mut interval = time::interval_at(started + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if matches!(
                self.reconcile().await,
                ReconcileOutcome::Closed | ReconcileOutcome::Skipped(SkipReason::NotRunning)
            ) {
                return;
            }
        }
    }

    async fn reconcile(self: &Arc<Self>) -> ReconcileOutcome {
        {
            let mut inner = lock(&self.inner);
            if !inner.state().is_running() {
                return ReconcileOutcome::Skipped(SkipReason::NotRunning);
            }
            if inner.reconcile_in_flight {
                debug!(session = %self.session_id, "progress request already in flight");
                return ReconcileOutcome::Skipped(SkipReason::InFlight);
            }
            inner.reconcile_in_flight = true;
        }
        let _in_flight = InFlight(self.as_ref());

        let report = match self.api.fetch_progress(self.session_id).await {
            Ok(report) => report,
            Err(err) => {
                warn!(session = %self.session_id, "reconciliation failed: {err}");
                return ReconcileOutcome::Failed;
            }
        };

        let mut inner = lock(&self.inner);
        match (report, inner.state()) {
            (ProgressReport::Closed, _) => {
                let claimed = inner.close_by_server();
                drop(inner);
                if claimed {
                    info!(session = %self.session_id, "server reports session closed");
                    self.begin_termination(TerminationCause::ClosedByServer);
                    ReconcileOutcome::Closed
                } else {
                    ReconcileOutcome::Skipped(SkipReason::NotRunning)
                }
            }
            (ProgressReport::Remaining(_), TimerState::Pending) => ReconcileOutcome::NotStarted,
            (ProgressReport::Remaining(server), TimerState::Active) => {
                let drift = inner.reconcile(server, self.config.drift_tolerance);
                let event = inner.check_expiry();
                let frame = inner.frame();
                drop(inner);
                if event == TickEvent::Expired {
                    self.begin_termination(TerminationCause::Expired);
                } else if drift.is_corrected() {
                    self.view.render(&frame);
                }
                ReconcileOutcome::Reconciled(drift)
            }
            (ProgressReport::Remaining(_), _) => ReconcileOutcome::Skipped(SkipReason::NotRunning),
        }
    }
}

/// Clears the in-flight flag even if the request future is dropped.
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(&self.0.inner).reconcile_in_flight = false;
    }
}

//
// ─── SESSION TIMER ─────────────────────────────────────────────────────────────
//

/// Countdown for one timed session, owning its schedules.
///
/// Dropping the timer disposes it.
pub struct SessionTimer {
    shared: Arc<Shared>,
}

impl SessionTimer {
    /// Build a timer from the page's embedded data.
    ///
    /// Returns `Ok(None)` when the page has no timer mount.
    ///
    /// # Errors
    ///
    /// Returns `PageError` if the page data does not describe a valid session.
    pub fn mount(
        page: &PageData,
        clock: Clock,
        config: TimerConfig,
        api: Arc<dyn SessionApi>,
        view: Arc<dyn TimerView>,
    ) -> Result<Option<Self>, PageError> {
        if !page.timer_mounted {
            debug!(session = %page.session_id, "no timer mount on page");
            return Ok(None);
        }
        let session = page.session(clock.now())?;
        let csrf = page.csrf_token();
        if csrf.is_none() {
            warn!(session = %page.session_id, "no CSRF token found; finish may be rejected");
        }
        Ok(Some(Self::new(&session, clock, config, api, view, csrf)))
    }

    #[must_use]
    pub fn new(
        session: &Session,
        clock: Clock,
        config: TimerConfig,
        api: Arc<dyn SessionApi>,
        view: Arc<dyn TimerView>,
        csrf: Option<CsrfToken>,
    ) -> Self {
        let inner = TimerInner::new(session, clock.now(), config.thresholds);
        let (schedule_tx, _) = watch::channel(false);
        let (exit_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                session_id: session.id(),
                endpoints: Endpoints::new(config.base_url.clone()),
                config,
                csrf,
                api,
                view,
                inner: Mutex::new(inner),
                schedule_tx,
                exit_tx,
                started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        lock(&self.shared.inner).state()
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        lock(&self.shared.inner).clock().remaining()
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        lock(&self.shared.inner).clock().total()
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        lock(&self.shared.inner).clock().progress()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// Render the first frame and start the tick and reconciliation schedules.
    ///
    /// Must be called inside a tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        if !self.state().is_running() || self.shared.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let started = Instant::now();
        info!(session = %self.shared.session_id, "starting session timer");

        let event = lock(&self.shared.inner).check_expiry();
        if event == TickEvent::Expired {
            // Page was rendered after the deadline.
            self.shared.begin_termination(TerminationCause::Expired);
            return;
        }
        self.shared.render();

        for schedule in [Schedule::Tick, Schedule::Reconcile] {
            let shared = Arc::clone(&self.shared);
            let session_id = self.shared.session_id;
            let stop_rx = self.shared.schedule_tx.subscribe();
            self.shared.spawn(async move {
                tokio::select! {
                    () = stopped(stop_rx) => {
                        debug!(session = %session_id, ?schedule, "schedule cancelled");
                    }
                    () = schedule.run(shared, started) => {}
                }
            });
        }
    }

    /// Cancel the tick and reconciliation schedules, keeping the current state.
    ///
    /// A termination that already started keeps running.
    pub fn stop(&self) {
        self.shared.schedule_tx.send_replace(true);
    }

    /// Run one reconciliation against the server now.
    pub async fn reconcile_now(&self) -> ReconcileOutcome {
        self.shared.reconcile().await
    }

    /// Tear the timer down: cancel all schedules and any pending termination.
    ///
    /// Safe to call more than once.
    pub fn dispose(&self) {
        let disposed = lock(&self.shared.inner).state_mut().dispose();
        self.shared.schedule_tx.send_replace(true);
        self.shared.exit_tx.send_replace(true);
        if disposed {
            info!(session = %self.shared.session_id, "session timer disposed");
        }
    }

    /// Wait for every task spawned by this timer to exit.
    ///
    /// Resolves once the timer has terminated, or after `stop`/`dispose`.
    pub async fn join(&self) {
        loop {
            let pending: Vec<_> = lock(&self.shared.tasks).drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for task in pending {
                match task.await {
                    Err(err) if err.is_panic() => {
                        error!(session = %self.shared.session_id, "timer task panicked");
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[derive(Debug, Clone, Copy)]
enum Schedule {
    Tick,
    Reconcile,
}

impl Schedule {
    async fn run(self, shared: Arc<Shared>, started: Instant) {
        match self {
            Schedule::Tick => shared.run_ticks(started).await,
            Schedule::Reconcile => shared.run_reconciliation(started).await,
        }
    }
}

#[cfg(test)]
mod tests;
