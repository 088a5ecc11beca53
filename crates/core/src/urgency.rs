use std::collections::BTreeSet;
use std::time::Duration;

//
// ─── BANDS ─────────────────────────────────────────────────────────────────────
//

/// Discrete visual urgency derived from the time left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrgencyBand {
    Normal,
    Warning,
    Critical,
}

/// Inclusive upper bounds of the warning and critical bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyThresholds {
    warning: Duration,
    critical: Duration,
}

impl UrgencyThresholds {
    /// Build thresholds, swapping the values if given in the wrong order.
    #[must_use]
    pub fn new(warning: Duration, critical: Duration) -> Self {
        if critical > warning {
            Self {
                warning: critical,
                critical: warning,
            }
        } else {
            Self { warning, critical }
        }
    }

    #[must_use]
    pub fn warning(&self) -> Duration {
        self.warning
    }

    #[must_use]
    pub fn critical(&self) -> Duration {
        self.critical
    }

    /// Band for the given remaining time. An expired countdown counts as critical.
    #[must_use]
    pub fn classify(&self, remaining: Duration) -> UrgencyBand {
        if remaining <= self.critical {
            UrgencyBand::Critical
        } else if remaining <= self.warning {
            UrgencyBand::Warning
        } else {
            UrgencyBand::Normal
        }
    }
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            warning: Duration::from_secs(5 * 60),
            critical: Duration::from_secs(60),
        }
    }
}

//
// ─── STYLE CLASSES ─────────────────────────────────────────────────────────────
//

pub const CLASS_NORMAL: &str = "text-blue-600";
pub const CLASS_WARNING: &str = "text-yellow-600";
pub const CLASS_CRITICAL: &str = "text-red-600";
pub const CLASS_PULSE: &str = "animate-pulse";

impl UrgencyBand {
    /// Color class for this band.
    #[must_use]
    pub fn color_class(self) -> &'static str {
        match self {
            UrgencyBand::Normal => CLASS_NORMAL,
            UrgencyBand::Warning => CLASS_WARNING,
            UrgencyBand::Critical => CLASS_CRITICAL,
        }
    }

    #[must_use]
    pub fn pulses(self) -> bool {
        matches!(self, UrgencyBand::Critical)
    }
}

/// Set of style classes on the timer mount.
///
/// Every mutation reports whether it changed anything, so repeated
/// application of the same band is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSet {
    classes: BTreeSet<&'static str>,
}

impl ClassSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the class was not present before.
    pub fn insert(&mut self, class: &'static str) -> bool {
        self.classes.insert(class)
    }

    /// Returns `true` if the class was present before.
    pub fn remove(&mut self, class: &'static str) -> bool {
        self.classes.remove(class)
    }

    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.iter().copied()
    }

    /// Apply the classes for `band`, removing those of other bands.
    ///
    /// Returns `true` if the pulse class was newly added by this call.
    pub fn apply_band(&mut self, band: UrgencyBand) -> bool {
        for other in [UrgencyBand::Normal, UrgencyBand::Warning, UrgencyBand::Critical] {
            if other != band {
                self.remove(other.color_class());
            }
        }
        self.insert(band.color_class());

        if band.pulses() {
            self.insert(CLASS_PULSE)
        } else {
            self.remove(CLASS_PULSE);
            false
        }
    }
}
