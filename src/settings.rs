//! Tuning knobs handed to the engine by its caller.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{MAX_SCORE, MIN_SCORE};

pub const DEFAULT_ALERT_THRESHOLD: f64 = 6.0;
pub const DEFAULT_TREND_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_MIN_GROUP_SAMPLES: usize = 2;
pub const DEFAULT_TREND_DEAD_BAND: f64 = 0.1;
pub const DEFAULT_ALERT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_ALERT_LIMIT: usize = 20;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 15;
/// Longest accepted window, in days.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Score boundary below which a check counts as low quality (strict `<`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct AlertThreshold(f64);

impl AlertThreshold {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidThreshold`] for NaN, infinities and
    /// values outside [1, 10].
    pub fn new(value: f64) -> Result<Self, EngineError> {
        let range = f64::from(MIN_SCORE)..=f64::from(MAX_SCORE);
        if value.is_finite() && range.contains(&value) {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for AlertThreshold {
    fn default() -> Self {
        Self(DEFAULT_ALERT_THRESHOLD)
    }
}

impl TryFrom<f64> for AlertThreshold {
    type Error = EngineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlertThreshold> for f64 {
    fn from(threshold: AlertThreshold) -> Self {
        threshold.0
    }
}

/// Inclusive upper score bounds of the critical and high alert tiers.
/// Anything above `high_max` is medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub critical_max: u8,
    pub high_max: u8,
}

impl SeverityBands {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSeverityBands`] unless
    /// `1 <= critical_max < high_max <= 10`.
    pub fn new(critical_max: u8, high_max: u8) -> Result<Self, EngineError> {
        if critical_max >= MIN_SCORE && critical_max < high_max && high_max <= MAX_SCORE {
            Ok(Self {
                critical_max,
                high_max,
            })
        } else {
            Err(EngineError::InvalidSeverityBands {
                critical_max,
                high_max,
            })
        }
    }
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            critical_max: 3,
            high_max: 5,
        }
    }
}

/// Everything the engine's callers need to agree on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub alert_threshold: AlertThreshold,
    /// Length of the current and comparison windows for trends.
    pub trend_window_days: i64,
    /// Groups with fewer records are left out of ranked comparisons.
    pub min_group_samples: usize,
    pub trend_dead_band: f64,
    pub severity_bands: SeverityBands,
    pub alert_window_days: i64,
    pub alert_limit: usize,
    pub cache_ttl_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            alert_threshold: AlertThreshold::default(),
            trend_window_days: DEFAULT_TREND_WINDOW_DAYS,
            min_group_samples: DEFAULT_MIN_GROUP_SAMPLES,
            trend_dead_band: DEFAULT_TREND_DEAD_BAND,
            severity_bands: SeverityBands::default(),
            alert_window_days: DEFAULT_ALERT_WINDOW_DAYS,
            alert_limit: DEFAULT_ALERT_LIMIT,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl EngineSettings {
    /// Re-check the invariants that plain field assignment can break.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] found.
    pub fn validate(&self) -> Result<(), EngineError> {
        AlertThreshold::new(self.alert_threshold.value())?;
        SeverityBands::new(self.severity_bands.critical_max, self.severity_bands.high_max)?;
        validate_dead_band(self.trend_dead_band)?;
        validate_window_days(self.trend_window_days)?;
        validate_window_days(self.alert_window_days)?;
        Ok(())
    }
}

pub(crate) fn validate_dead_band(dead_band: f64) -> Result<(), EngineError> {
    if dead_band.is_finite() && dead_band >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidDeadBand(dead_band))
    }
}

pub(crate) fn validate_window_days(days: i64) -> Result<(), EngineError> {
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(EngineError::InvalidWindow(days))
    }
}
