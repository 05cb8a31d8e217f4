use thiserror::Error;

/// Rejected engine calls. Every variant is a caller configuration mistake;
/// empty input is never reported here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("score range is inverted: min {min} > max {max}")]
    InvertedScoreRange { min: u8, max: u8 },

    #[error("alert threshold must be a number in [1, 10], got {0}")]
    InvalidThreshold(f64),

    #[error("unknown severity: {0} (expected medium, high or critical)")]
    UnknownSeverity(String),

    #[error("unknown grouping key: {0} (expected branch, chef or dish)")]
    UnknownGroupKey(String),

    #[error("severity bands must satisfy 1 <= critical_max ({critical_max}) < high_max ({high_max}) <= 10")]
    InvalidSeverityBands { critical_max: u8, high_max: u8 },

    #[error("trend dead-band must be a non-negative number, got {0}")]
    InvalidDeadBand(f64),

    #[error("window length must be between 1 and 36500 days, got {0}")]
    InvalidWindow(i64),
}

/// A record that cannot become a [`crate::models::QualityCheck`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{field} score {value} is outside [1, 10]")]
    ScoreOutOfRange { field: &'static str, value: i64 },

    #[error("unknown check status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid engine settings: {0}")]
    Engine(#[from] EngineError),
}
