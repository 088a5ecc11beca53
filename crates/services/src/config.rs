use std::env;
use std::str::FromStr;
use std::time::Duration;

use olympiad_core::UrgencyThresholds;
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONCILE: Duration = Duration::from_secs(60);
pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);
pub const DEFAULT_FINISH_ATTEMPTS: u32 = 3;
pub const DEFAULT_FINISH_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MIN_GRACE: Duration = Duration::from_secs(3);
const MAX_GRACE: Duration = Duration::from_secs(5);

/// Cadences and endpoints for a session timer.
#[derive(Clone, Debug)]
pub struct TimerConfig {
    pub base_url: Url,
    pub tick_interval: Duration,
    pub reconcile_interval: Duration,
    pub drift_tolerance: Duration,
    pub grace_delay: Duration,
    pub finish_attempts: u32,
    pub finish_retry_delay: Duration,
    pub request_timeout: Duration,
    pub thresholds: UrgencyThresholds,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            tick_interval: DEFAULT_TICK,
            reconcile_interval: DEFAULT_RECONCILE,
            drift_tolerance: DEFAULT_DRIFT_TOLERANCE,
            grace_delay: DEFAULT_GRACE,
            finish_attempts: DEFAULT_FINISH_ATTEMPTS,
            finish_retry_delay: DEFAULT_FINISH_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            thresholds: UrgencyThresholds::default(),
        }
    }
}

impl TimerConfig {
    /// Read `OLYMPIAD_*` variables, falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but malformed or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = var("OLYMPIAD_BASE_URL") {
            config = config.with_base_url(&raw)?;
        }
        if let Some(ms) = parse_var::<u64>("OLYMPIAD_TICK_MS")? {
            config = config.with_tick_interval(Duration::from_millis(ms))?;
        }
        if let Some(secs) = parse_var::<u64>("OLYMPIAD_RECONCILE_SECS")? {
            config = config.with_reconcile_interval(Duration::from_secs(secs))?;
        }
        if let Some(secs) = parse_var::<u64>("OLYMPIAD_DRIFT_TOLERANCE_SECS")? {
            config.drift_tolerance = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("OLYMPIAD_GRACE_SECS")? {
            config = config.with_grace_delay(Duration::from_secs(secs))?;
        }
        if let Some(attempts) = parse_var::<u32>("OLYMPIAD_FINISH_ATTEMPTS")? {
            config = config.with_finish_attempts(attempts)?;
        }

        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `raw` is not an absolute URL.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
            raw: raw.to_string(),
            source,
        })?;
        // Relative joins drop the last segment unless the path ends with a slash.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base_url = url;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::ZeroInterval` for a zero cadence.
    pub fn with_tick_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval("tick_interval"));
        }
        self.tick_interval = interval;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::ZeroInterval` for a zero cadence.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval("reconcile_interval"));
        }
        self.reconcile_interval = interval;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::GraceOutOfRange` outside 3..=5 seconds.
    pub fn with_grace_delay(mut self, delay: Duration) -> Result<Self, ConfigError> {
        if !(MIN_GRACE..=MAX_GRACE).contains(&delay) {
            return Err(ConfigError::GraceOutOfRange(delay));
        }
        self.grace_delay = delay;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::ZeroAttempts` if `attempts` is zero.
    pub fn with_finish_attempts(mut self, attempts: u32) -> Result<Self, ConfigError> {
        if attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        self.finish_attempts = attempts;
        Ok(self)
    }

    #[must_use]
    pub fn with_drift_tolerance(mut self, tolerance: Duration) -> Self {
        self.drift_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: UrgencyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            debug!("{key} not set, using default");
            None
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { key, raw })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_cadences() {
        let config = TimerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.drift_tolerance, Duration::from_secs(60));
        assert_eq!(config.grace_delay, Duration::from_secs(3));
    }

    #[test]
    fn grace_delay_is_bounded() {
        assert!(
            TimerConfig::default()
                .with_grace_delay(Duration::from_secs(5))
                .is_ok()
        );
        let err = TimerConfig::default()
            .with_grace_delay(Duration::from_secs(10))
            .unwrap_err();
        assert!(matches!(err, ConfigError::GraceOutOfRange(_)));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(matches!(
            TimerConfig::default().with_tick_interval(Duration::ZERO),
            Err(ConfigError::ZeroInterval("tick_interval"))
        ));
        assert!(matches!(
            TimerConfig::default().with_finish_attempts(0),
            Err(ConfigError::ZeroAttempts)
        ));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = TimerConfig::default()
            .with_base_url("https://school.example/app")
            .unwrap();
        assert_eq!(config.base_url.as_str(), "https://school.example/app/");
    }

    #[test]
    fn invalid_base_url() {
        let err = TimerConfig::default().with_base_url("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }
}
