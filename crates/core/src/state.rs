use thiserror::Error;

/// Why the timer left the running states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationCause {
    /// Local countdown reached zero.
    Expired,
    /// Server reported the session as already finished.
    ClosedByServer,
    /// Page teardown before the session ended.
    Disposed,
}

/// Lifecycle of a session timer.
///
/// ```text
/// Pending -> Active -> Expiring -> Terminated
///    \          \__________________/^
///     \_______________________________/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    Pending,
    Active,
    Expiring(TerminationCause),
    Terminated(TerminationCause),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    #[error("cannot move timer from {from:?} to {to}")]
    Invalid { from: TimerState, to: &'static str },
}

impl TimerState {
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, TimerState::Pending | TimerState::Active)
    }

    #[must_use]
    pub fn is_terminated(self) -> bool {
        matches!(self, TimerState::Terminated(_))
    }

    /// `Pending -> Active`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Invalid` from any other state.
    pub fn activate(&mut self) -> Result<(), TransitionError> {
        match *self {
            TimerState::Pending => {
                *self = TimerState::Active;
                Ok(())
            }
            from => Err(TransitionError::Invalid {
                from,
                to: "Active",
            }),
        }
    }

    /// One-shot guard for the terminal path.
    ///
    /// Moves a running timer into `Expiring` and returns `true`. Every later
    /// call returns `false`, so exactly one caller submits termination.
    pub fn begin_expiry(&mut self, cause: TerminationCause) -> bool {
        if self.is_running() {
            *self = TimerState::Expiring(cause);
            true
        } else {
            false
        }
    }

    /// `Expiring -> Terminated`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Invalid` unless the timer is expiring.
    pub fn finish(&mut self) -> Result<TerminationCause, TransitionError> {
        match *self {
            TimerState::Expiring(cause) => {
                *self = TimerState::Terminated(cause);
                Ok(cause)
            }
            from => Err(TransitionError::Invalid {
                from,
                to: "Terminated",
            }),
        }
    }

    /// Teardown from any non-terminal state. Returns `false` if already terminated.
    pub fn dispose(&mut self) -> bool {
        if self.is_terminated() {
            return false;
        }
        *self = TimerState::Terminated(TerminationCause::Disposed);
        true
    }
}
