use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SessionId;
use crate::time::{non_negative, to_time_delta};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session ends before it starts")]
    InvalidTimeRange,

    #[error("session has a zero-length time limit")]
    EmptyTimeLimit,

    #[error("session end lies outside the representable calendar")]
    OutOfRange,
}

/// How the end of an attempt is expressed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deadline {
    /// Absolute end timestamp (olympiad closes for everyone at once).
    EndsAt(DateTime<Utc>),
    /// Per-attempt time limit counted from the start.
    TimeLimit(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Active,
    Expired,
}

impl SessionStatus {
    /// Human-readable status text shown next to the countdown.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Pending => "Waiting to start",
            SessionStatus::Active => "Active",
            SessionStatus::Expired => "Finished",
        }
    }
}

/// Read-only client projection of a server-owned timed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    starts_at: DateTime<Utc>,
    deadline: Deadline,
}

impl Session {
    /// Session that closes at an absolute timestamp.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTimeRange` if `ends_at` is before `starts_at`.
    pub fn ending_at(
        id: SessionId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if ends_at < starts_at {
            return Err(SessionError::InvalidTimeRange);
        }
        Ok(Self {
            id,
            starts_at,
            deadline: Deadline::EndsAt(ends_at),
        })
    }

    /// Session that lasts `limit` from `starts_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyTimeLimit` for a zero limit and
    /// `SessionError::OutOfRange` if the end cannot be represented.
    pub fn with_time_limit(
        id: SessionId,
        starts_at: DateTime<Utc>,
        limit: Duration,
    ) -> Result<Self, SessionError> {
        if limit.is_zero() {
            return Err(SessionError::EmptyTimeLimit);
        }
        if starts_at.checked_add_signed(to_time_delta(limit)).is_none() {
            return Err(SessionError::OutOfRange);
        }
        Ok(Self {
            id,
            starts_at,
            deadline: Deadline::TimeLimit(limit),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        match self.deadline {
            Deadline::EndsAt(at) => at,
            // Constructors reject limits that overflow the calendar.
            Deadline::TimeLimit(limit) => self
                .starts_at
                .checked_add_signed(to_time_delta(limit))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Full length of the attempt.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self.deadline {
            Deadline::EndsAt(at) => non_negative(at - self.starts_at),
            Deadline::TimeLimit(limit) => limit,
        }
    }

    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        if now < self.starts_at {
            SessionStatus::Pending
        } else if now < self.ends_at() {
            SessionStatus::Active
        } else {
            SessionStatus::Expired
        }
    }

    /// Time left until the session closes, clamped at zero.
    ///
    /// For a pending session this is the whole duration plus the wait.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        non_negative(self.ends_at() - now)
    }

    /// Time left until the session opens, zero once it has started.
    #[must_use]
    pub fn until_start(&self, now: DateTime<Utc>) -> Duration {
        non_negative(self.starts_at - now)
    }
}
