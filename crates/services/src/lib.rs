#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod csrf;
pub mod error;
pub mod page;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timer;
pub mod view;

pub use olympiad_core::Clock;

pub use api::{Endpoints, HttpSessionApi, ProgressReport, SessionApi};
pub use config::TimerConfig;
pub use csrf::CsrfToken;
pub use error::{ApiError, ConfigError, PageError};
pub use page::PageData;
pub use timer::{ReconcileOutcome, SessionTimer, SkipReason};
pub use view::{FramePhase, TimerFrame, TimerView};
