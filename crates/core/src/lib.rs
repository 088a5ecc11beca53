#![forbid(unsafe_code)]

pub mod countdown;
pub mod error;
pub mod format;
pub mod model;
pub mod state;
pub mod time;
pub mod urgency;

pub use countdown::{ClientClock, Drift};
pub use error::Error;
pub use format::{TimeBreakdown, format_remaining};
pub use state::{TerminationCause, TimerState, TransitionError};
pub use time::Clock;
pub use urgency::{ClassSet, UrgencyBand, UrgencyThresholds};
