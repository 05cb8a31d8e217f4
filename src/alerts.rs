use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{is_valid_score, QualityCheck};
use crate::filter::AggregationWindow;
use crate::settings::{AlertThreshold, EngineSettings, SeverityBands};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn classify(score: u8, bands: SeverityBands) -> Self {
        if score <= bands.critical_max {
            Severity::Critical
        } else if score <= bands.high_max {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(EngineError::UnknownSeverity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowScoreAlert {
    pub severity: Severity,
    pub check: QualityCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertQuery {
    pub threshold: AlertThreshold,
    pub window_days: i64,
    pub limit: usize,
    /// End of the lookback window; the window is `[as_of - window_days, as_of)`.
    pub as_of: DateTime<Utc>,
    pub bands: SeverityBands,
    /// Keep only alerts of this tier. Applied before truncation.
    pub severity: Option<Severity>,
}

impl AlertQuery {
    pub fn from_settings(settings: &EngineSettings, as_of: DateTime<Utc>) -> Self {
        Self {
            threshold: settings.alert_threshold,
            window_days: settings.alert_window_days,
            limit: settings.alert_limit,
            as_of,
            bands: settings.severity_bands,
            severity: None,
        }
    }
}

/// Unresolved checks scoring strictly below the threshold within the
/// lookback window, newest first, at most `query.limit` of them.
///
/// # Errors
///
/// Returns [`EngineError::InvalidWindow`] when `window_days` is out of range.
pub fn find_low_score_alerts(
    records: &[QualityCheck],
    query: &AlertQuery,
) -> Result<Vec<LowScoreAlert>, EngineError> {
    let window = AggregationWindow::trailing(query.as_of, query.window_days)?;

    let mut alerts: Vec<LowScoreAlert> = records
        .iter()
        .filter(|check| {
            debug_assert!(is_valid_score(check.overall_score));
            check.is_low_score(query.threshold.value())
                && window.contains(check.created_at)
                && check.status.is_unresolved()
        })
        .map(|check| LowScoreAlert {
            severity: Severity::classify(check.overall_score, query.bands),
            check: check.clone(),
        })
        .filter(|alert| query.severity.map_or(true, |s| s == alert.severity))
        .collect();

    alerts.sort_by(|a, b| {
        b.check
            .created_at
            .cmp(&a.check.created_at)
            .then_with(|| a.check.id.cmp(&b.check.id))
    });
    alerts.truncate(query.limit);
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::CheckStatus;
    use crate::test_support::{as_of, check, sample_records, with_status};

    fn query() -> AlertQuery {
        AlertQuery::from_settings(&EngineSettings::default(), as_of())
    }

    #[test]
    fn threshold_is_strict_and_tiers_are_inclusive() {
        let records = vec![
            check("A", "x", "d", 6, 1),
            check("A", "x", "d", 5, 2),
            check("A", "x", "d", 3, 3),
            check("A", "x", "d", 4, 4),
        ];
        let alerts = find_low_score_alerts(&records, &query()).unwrap();
        let found: Vec<(u8, Severity)> = alerts
            .iter()
            .map(|a| (a.check.overall_score, a.severity))
            .collect();
        assert_eq!(
            found,
            vec![
                (5, Severity::High),
                (3, Severity::Critical),
                (4, Severity::High)
            ]
        );
    }

    #[test]
    fn medium_tier_between_high_and_threshold() {
        let q = AlertQuery {
            threshold: AlertThreshold::new(8.0).unwrap(),
            ..query()
        };
        let alerts = find_low_score_alerts(&[check("A", "x", "d", 7, 1)], &q).unwrap();
        assert_eq!(alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn resolved_and_stale_checks_are_ignored() {
        let records = vec![
            with_status(check("A", "x", "d", 2, 1), CheckStatus::Resolved),
            with_status(check("A", "x", "d", 2, 1), CheckStatus::Closed),
            with_status(check("A", "x", "d", 2, 1), CheckStatus::InProgress),
            check("A", "x", "d", 2, 24 * 8),
        ];
        let alerts = find_low_score_alerts(&records, &query()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].check.status, CheckStatus::InProgress);
    }

    #[test]
    fn newest_first_then_truncated() {
        let records: Vec<_> = (1..=5).map(|h| check("A", "x", "d", 2, h)).collect();
        let q = AlertQuery { limit: 2, ..query() };
        let alerts = find_low_score_alerts(&records, &q).unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].check.created_at > alerts[1].check.created_at);
        assert_eq!(alerts[0].check.created_at, as_of() - Duration::hours(1));
    }

    #[test]
    fn severity_filter_runs_before_limit() {
        let records = vec![
            check("A", "x", "d", 5, 1),
            check("A", "x", "d", 5, 2),
            check("A", "x", "d", 1, 3),
        ];
        let q = AlertQuery {
            limit: 1,
            severity: Some(Severity::Critical),
            ..query()
        };
        let alerts = find_low_score_alerts(&records, &q).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].check.overall_score, 1);
    }

    #[test]
    fn custom_bands_shift_tiers() {
        let bands = SeverityBands::new(2, 4).unwrap();
        assert_eq!(Severity::classify(3, bands), Severity::High);
        assert_eq!(Severity::classify(5, bands), Severity::Medium);
        assert_eq!(Severity::classify(2, bands), Severity::Critical);
    }

    #[test]
    fn zero_day_window_is_rejected() {
        let q = AlertQuery {
            window_days: 0,
            ..query()
        };
        assert_eq!(
            find_low_score_alerts(&sample_records(), &q),
            Err(EngineError::InvalidWindow(0))
        );
    }

    #[test]
    fn empty_input_has_no_alerts() {
        assert!(find_low_score_alerts(&[], &query()).unwrap().is_empty());
    }

    #[test]
    fn checks_at_or_after_as_of_are_not_alerted() {
        let records = vec![
            check("A", "x", "d", 2, -72),
            check("A", "x", "d", 2, 0),
            check("A", "x", "d", 2, 1),
        ];
        let alerts = find_low_score_alerts(&records, &query()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].check.created_at, as_of() - Duration::hours(1));
    }

    #[test]
    fn oversized_window_is_rejected_not_overflowed() {
        let q = AlertQuery {
            window_days: i64::MAX / 2,
            ..query()
        };
        assert_eq!(
            find_low_score_alerts(&sample_records(), &q),
            Err(EngineError::InvalidWindow(i64::MAX / 2))
        );
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(" Critical ".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!(
            "urgent".parse::<Severity>(),
            Err(EngineError::UnknownSeverity("urgent".to_string()))
        );
    }
}
