use std::collections::HashMap;
use std::env::VarError;

use crate::error::ConfigError;
use crate::settings::{AlertThreshold, EngineSettings, SeverityBands};

const ALERT_LOW_SCORE_KEY: &str = "alert_low_score";
const MIN_GROUP_SAMPLES_KEY: &str = "min_dish_reviews_weekly";

/// Keys of the `settings` table that override engine settings.
pub const STORED_SETTING_KEYS: [&str; 2] = [ALERT_LOW_SCORE_KEY, MIN_GROUP_SAMPLES_KEY];

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub log_level: String,
    pub db_max_connections: u32,
    pub engine: EngineSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("log_level", &self.log_level)
            .field("db_max_connections", &self.db_max_connections)
            .field("engine", &self.engine)
            .finish()
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `DATABASE_URL` was not set.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

/// Load configuration, reading a `.env` file first if one exists.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is present but malformed, or if the
/// resulting engine settings are inconsistent.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_app_config(|key| std::env::var(key))
}

/// Build configuration from an arbitrary variable lookup so tests can feed a
/// plain map.
pub(crate) fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let database_url = lookup("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
    let log_level = lookup("KQ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let db_max_connections = parse_or(&lookup, "KQ_DB_MAX_CONNECTIONS", 5u32)?;
    let engine = build_engine_settings(&lookup)?;

    Ok(AppConfig {
        database_url,
        log_level,
        db_max_connections,
        engine,
    })
}

fn build_engine_settings<F>(lookup: &F) -> Result<EngineSettings, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let defaults = EngineSettings::default();

    let threshold: f64 = parse_or(lookup, "KQ_ALERT_THRESHOLD", defaults.alert_threshold.value())?;
    let critical_max: u8 = parse_or(
        lookup,
        "KQ_SEVERITY_CRITICAL_MAX",
        defaults.severity_bands.critical_max,
    )?;
    let high_max: u8 = parse_or(lookup, "KQ_SEVERITY_HIGH_MAX", defaults.severity_bands.high_max)?;

    let settings = EngineSettings {
        alert_threshold: AlertThreshold::new(threshold)?,
        trend_window_days: parse_or(lookup, "KQ_TREND_WINDOW_DAYS", defaults.trend_window_days)?,
        min_group_samples: parse_or(lookup, "KQ_MIN_GROUP_SAMPLES", defaults.min_group_samples)?,
        trend_dead_band: parse_or(lookup, "KQ_TREND_DEAD_BAND", defaults.trend_dead_band)?,
        severity_bands: SeverityBands::new(critical_max, high_max)?,
        alert_window_days: parse_or(lookup, "KQ_ALERT_WINDOW_DAYS", defaults.alert_window_days)?,
        alert_limit: parse_or(lookup, "KQ_ALERT_LIMIT", defaults.alert_limit)?,
        cache_ttl_secs: parse_or(lookup, "KQ_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
    };
    settings.validate()?;
    Ok(settings)
}

/// Apply overrides stored in the `settings` table on top of `engine`.
///
/// Unknown keys are ignored; known keys with unparsable values are errors.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` naming the offending settings key.
pub fn apply_stored_settings(
    engine: &EngineSettings,
    stored: &HashMap<String, String>,
) -> Result<EngineSettings, ConfigError> {
    let lookup = |key: &str| stored.get(key).cloned().ok_or(VarError::NotPresent);
    let mut merged = engine.clone();

    let threshold: f64 = parse_or(&lookup, ALERT_LOW_SCORE_KEY, engine.alert_threshold.value())?;
    merged.alert_threshold = AlertThreshold::new(threshold)?;
    merged.min_group_samples = parse_or(&lookup, MIN_GROUP_SAMPLES_KEY, engine.min_group_samples)?;

    merged.validate()?;
    Ok(merged)
}

fn parse_or<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
