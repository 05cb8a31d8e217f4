//! Quality-check aggregation for multi-branch kitchens.
//!
//! The engine modules (`filter`, `aggregate`, `trend`, `alerts`,
//! `distribution`) are pure functions over `&[QualityCheck]`. `db`, `report`
//! and `config` are the collaborators the CLI wires around them.

pub mod aggregate;
pub mod alerts;
pub mod cache;
pub mod config;
pub mod db;
pub mod distribution;
pub mod error;
pub mod filter;
pub mod models;
pub mod report;
pub mod settings;
pub mod trend;

#[cfg(test)]
mod test_support;

pub use aggregate::{aggregate_by, aggregate_by_key, rank_groups, summarize, GroupKey, GroupStats};
pub use alerts::{find_low_score_alerts, AlertQuery, LowScoreAlert, Severity};
pub use distribution::{score_distribution, ScoreBucket};
pub use error::{ConfigError, EngineError, RecordError};
pub use filter::{filter_records, AggregationWindow, RecordFilter};
pub use models::{CheckStatus, DetailScores, NewQualityCheck, QualityCheck};
pub use settings::{AlertThreshold, EngineSettings, SeverityBands};
pub use trend::{compute_group_trends, compute_trend, TrendDirection, TrendMetric};
