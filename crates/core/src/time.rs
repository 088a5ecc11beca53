use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Wall-clock source used to project a session onto "now".
///
/// Countdown arithmetic never reads this directly; it only sees elapsed
/// durations. The clock is consulted when a page is first read and when a
/// pending session needs to know how long until it opens.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward, stopping at the end of the calendar.
    /// No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t = t
                .checked_add_signed(to_time_delta(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
    }

    /// Time left until `instant`, clamped at zero.
    #[must_use]
    pub fn until(&self, instant: DateTime<Utc>) -> Duration {
        non_negative(instant - self.now())
    }
}

/// Convert a signed chrono delta into a std duration, clamping negatives to zero.
#[must_use]
pub fn non_negative(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Convert a std duration into a chrono delta, saturating at the chrono maximum.
#[must_use]
pub fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
