use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate_by_key, GroupStats, PeriodSummary};
use crate::error::EngineError;
use crate::filter::AggregationWindow;
use crate::models::QualityCheck;
use crate::settings::validate_dead_band;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendMetric {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    /// `delta / previous * 100`, or 0 when there is no previous value.
    pub percentage: f64,
    pub direction: TrendDirection,
}

impl TrendMetric {
    /// Changes smaller than `dead_band` in absolute value are `Stable`.
    pub fn between(current: f64, previous: f64, dead_band: f64) -> Self {
        let delta = current - previous;
        let percentage = if previous == 0.0 {
            0.0
        } else {
            delta / previous * 100.0
        };
        let direction = if delta.abs() < dead_band {
            TrendDirection::Stable
        } else if delta > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };
        Self {
            current,
            previous,
            delta,
            percentage,
            direction,
        }
    }

    /// Missing values act as a zero baseline.
    pub fn between_optional(current: Option<f64>, previous: Option<f64>, dead_band: f64) -> Self {
        Self::between(current.unwrap_or(0.0), previous.unwrap_or(0.0), dead_band)
    }
}

/// Period-over-period change of the headline KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryTrend {
    pub average_score: TrendMetric,
    pub total_checks: TrendMetric,
    pub low_score_percentage: TrendMetric,
}

/// # Errors
///
/// Returns [`EngineError::InvalidDeadBand`] for a negative or non-finite
/// dead-band.
pub fn compute_trend(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    dead_band: f64,
) -> Result<SummaryTrend, EngineError> {
    validate_dead_band(dead_band)?;
    Ok(SummaryTrend {
        average_score: TrendMetric::between_optional(
            current.average_score,
            previous.average_score,
            dead_band,
        ),
        total_checks: TrendMetric::between(
            current.total_checks as f64,
            previous.total_checks as f64,
            dead_band,
        ),
        low_score_percentage: TrendMetric::between(
            current.low_score_percentage,
            previous.low_score_percentage,
            dead_band,
        ),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTrend {
    pub stats: GroupStats,
    pub mean: TrendMetric,
    pub count: TrendMetric,
}

/// Trend of every group present in `current` against the same group in
/// `previous`. Groups that only existed in the previous period are dropped.
///
/// # Errors
///
/// Returns [`EngineError::InvalidDeadBand`] for a negative or non-finite
/// dead-band.
pub fn compute_group_trends<K>(
    current: &BTreeMap<K, GroupStats>,
    previous: &BTreeMap<K, GroupStats>,
    dead_band: f64,
) -> Result<BTreeMap<K, GroupTrend>, EngineError>
where
    K: Ord + Clone,
{
    validate_dead_band(dead_band)?;
    Ok(current
        .iter()
        .map(|(key, stats)| {
            let before = previous.get(key);
            let trend = GroupTrend {
                stats: *stats,
                mean: TrendMetric::between_optional(
                    Some(stats.mean),
                    before.map(|s| s.mean),
                    dead_band,
                ),
                count: TrendMetric::between(
                    stats.count as f64,
                    before.map_or(0.0, |s| s.count as f64),
                    dead_band,
                ),
            };
            (key.clone(), trend)
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub average: f64,
    pub count: usize,
}

/// Daily (UTC) averages inside `window`, oldest first. Days with no records
/// are left out.
pub fn daily_series(records: &[QualityCheck], window: &AggregationWindow) -> Vec<TrendPoint> {
    aggregate_by_key(records, |check| {
        window
            .contains(check.created_at)
            .then(|| check.created_on())
    })
    .into_iter()
    .map(|(date, stats)| TrendPoint {
        date,
        average: stats.mean,
        count: stats.count,
    })
    .collect()
}
