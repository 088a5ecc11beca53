use std::time::Duration;

use olympiad_core::model::SessionId;
use olympiad_core::{ClassSet, TimeBreakdown, UrgencyBand};
use url::Url;

/// Which countdown a frame shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Counting down to the start of the session.
    UntilStart,
    /// Counting down to the end of the session.
    UntilEnd,
    Finished,
}

impl FramePhase {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FramePhase::UntilStart => "Until start:",
            FramePhase::UntilEnd => "Until the end:",
            FramePhase::Finished => "Olympiad finished",
        }
    }
}

/// Everything a view needs to draw one tick of the countdown.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerFrame {
    pub session_id: SessionId,
    pub phase: FramePhase,
    pub status: &'static str,
    pub remaining: Duration,
    pub breakdown: TimeBreakdown,
    pub text: String,
    /// Consumed fraction of the session, `0.0..=1.0`.
    pub progress: f64,
    pub urgency: UrgencyBand,
    pub classes: ClassSet,
    /// Set on the frame where the pulse animation was switched on.
    pub pulse_started: bool,
}

impl TimerFrame {
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        self.progress * 100.0
    }
}

/// Rendering surface for the timer.
///
/// Implementations must not block; they are called from the tick task.
pub trait TimerView: Send + Sync {
    fn render(&self, frame: &TimerFrame);

    fn show_terminal_message(&self, message: &str);

    /// Leave the exam page for the results view.
    fn navigate(&self, url: &Url);
}
