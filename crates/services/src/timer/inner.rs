use std::time::Duration;

use chrono::{DateTime, Utc};
use olympiad_core::format::ceil_secs;
use olympiad_core::model::{Session, SessionId, SessionStatus};
use olympiad_core::{
    ClassSet, ClientClock, Drift, TerminationCause, TimeBreakdown, TimerState, UrgencyBand,
    UrgencyThresholds, format_remaining,
};
use tracing::{debug, info};

use crate::view::{FramePhase, TimerFrame};

/// What a tick asks the tick task to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickEvent {
    Continue,
    /// This tick won the one-shot expiry guard.
    Expired,
    /// The timer already left the running states.
    Stopped,
}

/// Mutable timer state shared by the tick, reconciliation and termination tasks.
#[derive(Debug)]
pub(crate) struct TimerInner {
    session_id: SessionId,
    state: TimerState,
    clock: ClientClock,
    /// Session length used when a pending timer activates.
    active_duration: Duration,
    thresholds: UrgencyThresholds,
    classes: ClassSet,
    pub(crate) reconcile_in_flight: bool,
}

impl TimerInner {
    pub(crate) fn new(session: &Session, now: DateTime<Utc>, thresholds: UrgencyThresholds) -> Self {
        let (state, clock) = match session.status_at(now) {
            SessionStatus::Pending => (
                TimerState::Pending,
                ClientClock::new(session.until_start(now)),
            ),
            SessionStatus::Active | SessionStatus::Expired => (
                TimerState::Active,
                ClientClock::new(session.remaining_at(now)),
            ),
        };

        Self {
            session_id: session.id(),
            state,
            clock,
            active_duration: session.duration(),
            thresholds,
            classes: ClassSet::new(),
            reconcile_in_flight: false,
        }
    }

    pub(crate) fn state(&self) -> TimerState {
        self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut TimerState {
        &mut self.state
    }

    pub(crate) fn clock(&self) -> &ClientClock {
        &self.clock
    }

    /// Apply measured elapsed time.
    pub(crate) fn tick(&mut self, elapsed: Duration) -> TickEvent {
        match self.state {
            TimerState::Pending => {
                let waited = self.clock.remaining();
                self.clock.elapse(elapsed);
                if self.clock.is_expired() {
                    self.activate(elapsed.saturating_sub(waited));
                }
                self.check_expiry()
            }
            TimerState::Active => {
                self.clock.elapse(elapsed);
                self.check_expiry()
            }
            TimerState::Expiring(_) | TimerState::Terminated(_) => TickEvent::Stopped,
        }
    }

    /// Claim the terminal path if the active countdown hit zero.
    pub(crate) fn check_expiry(&mut self) -> TickEvent {
        if self.state == TimerState::Active
            && self.clock.is_expired()
            && self.state.begin_expiry(TerminationCause::Expired)
        {
            info!(session = %self.session_id, "countdown reached zero");
            return TickEvent::Expired;
        }
        if self.state.is_running() {
            TickEvent::Continue
        } else {
            TickEvent::Stopped
        }
    }

    fn activate(&mut self, overshoot: Duration) {
        if self.state.activate().is_ok() {
            self.clock = ClientClock::new(self.active_duration);
            self.clock.elapse(overshoot);
            self.classes = ClassSet::new();
            info!(session = %self.session_id, "session started");
        }
    }

    /// Server-reported closure. Returns `true` if this call claimed the terminal path.
    pub(crate) fn close_by_server(&mut self) -> bool {
        if self.state.begin_expiry(TerminationCause::ClosedByServer) {
            self.clock.expire();
            true
        } else {
            false
        }
    }

    pub(crate) fn reconcile(&mut self, server_remaining: Duration, tolerance: Duration) -> Drift {
        let drift = self.clock.reconcile(server_remaining, tolerance);
        if let Drift::Corrected {
            previous, current, ..
        } = drift
        {
            info!(
                session = %self.session_id,
                previous_secs = previous.as_secs(),
                current_secs = current.as_secs(),
                "local countdown corrected from server"
            );
        } else {
            debug!(session = %self.session_id, "countdown within tolerance");
        }
        drift
    }

    /// Build the frame for the current state, updating style classes.
    pub(crate) fn frame(&mut self) -> TimerFrame {
        let (phase, status) = match self.state {
            TimerState::Pending => (FramePhase::UntilStart, SessionStatus::Pending),
            TimerState::Active => (FramePhase::UntilEnd, SessionStatus::Active),
            TimerState::Expiring(_) | TimerState::Terminated(_) => {
                (FramePhase::Finished, SessionStatus::Expired)
            }
        };

        let remaining = match phase {
            FramePhase::Finished => Duration::ZERO,
            _ => self.clock.remaining(),
        };
        // Waiting for the start is never urgent.
        let urgency = match phase {
            FramePhase::UntilStart => UrgencyBand::Normal,
            _ => self.thresholds.classify(remaining),
        };
        let pulse_started = self.classes.apply_band(urgency);

        let progress = match phase {
            FramePhase::UntilStart => 0.0,
            FramePhase::UntilEnd => self.clock.progress(),
            FramePhase::Finished => 1.0,
        };

        TimerFrame {
            session_id: self.session_id,
            phase,
            status: status.label(),
            remaining,
            breakdown: TimeBreakdown::from_secs(ceil_secs(remaining)),
            text: format_remaining(remaining),
            progress,
            urgency,
            classes: self.classes.clone(),
            pulse_started,
        }
    }
}
