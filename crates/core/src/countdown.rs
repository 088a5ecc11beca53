use std::time::Duration;

use crate::format::{TimeBreakdown, ceil_secs};

/// Outcome of comparing the local countdown with the server's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// Local and server agree within tolerance; nothing changed.
    Within { delta: Duration },
    /// Local value was overwritten by the server value.
    Corrected {
        previous: Duration,
        current: Duration,
        total_raised: bool,
    },
}

impl Drift {
    #[must_use]
    pub fn is_corrected(&self) -> bool {
        matches!(self, Drift::Corrected { .. })
    }
}

/// Local countdown for a timed session.
///
/// `remaining` only moves down through [`ClientClock::elapse`] and is never
/// negative. `total` is the progress denominator and never shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientClock {
    remaining: Duration,
    total: Duration,
}

impl ClientClock {
    #[must_use]
    pub fn new(remaining: Duration) -> Self {
        Self {
            remaining,
            total: remaining,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Remaining whole seconds, rounding a partial second up.
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        ceil_secs(self.remaining)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Subtract measured wall-clock time, flooring at zero.
    pub fn elapse(&mut self, elapsed: Duration) -> Duration {
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.remaining
    }

    /// Fraction of the session consumed, in `[0.0, 1.0]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total.is_zero() {
            return 1.0;
        }
        let fraction = 1.0 - self.remaining.as_secs_f64() / self.total.as_secs_f64();
        fraction.clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn breakdown(&self) -> TimeBreakdown {
        TimeBreakdown::from_secs(self.remaining_secs())
    }

    /// Apply the server's authoritative remaining time.
    ///
    /// The server wins only when the difference exceeds `tolerance`.
    pub fn reconcile(&mut self, server_remaining: Duration, tolerance: Duration) -> Drift {
        let delta = self.remaining.abs_diff(server_remaining);
        if delta <= tolerance {
            return Drift::Within { delta };
        }

        let previous = self.remaining;
        self.remaining = server_remaining;
        let total_raised = server_remaining > self.total;
        if total_raised {
            self.total = server_remaining;
        }

        Drift::Corrected {
            previous,
            current: server_remaining,
            total_raised,
        }
    }

    /// Force the countdown to zero, e.g. when the server reports closure.
    pub fn expire(&mut self) {
        self.remaining = Duration::ZERO;
    }
}
