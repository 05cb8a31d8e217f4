use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use kitchen_quality::aggregate::{aggregate_by, rank_groups, GroupKey, RankOrder};
use kitchen_quality::alerts::{find_low_score_alerts, AlertQuery, Severity};
use kitchen_quality::cache::{Fingerprint, QueryCache};
use kitchen_quality::config::{apply_stored_settings, load_app_config};
use kitchen_quality::db::{self, FetchScope};
use kitchen_quality::distribution::score_distribution;
use kitchen_quality::error::EngineError;
use kitchen_quality::filter::{filter_records, AggregationWindow, RecordFilter};
use kitchen_quality::models::{CheckStatus, QualityCheck};
use kitchen_quality::report;
use kitchen_quality::settings::EngineSettings;
use kitchen_quality::trend::compute_group_trends;

#[derive(Parser)]
#[command(name = "kitchen-quality")]
#[command(about = "Dish quality tracking across restaurant branches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which records the caller may and wants to see.
#[derive(Args, Clone)]
struct Scope {
    /// Restrict to these branches (repeatable)
    #[arg(long = "branch")]
    branches: Vec<String>,
    #[arg(long, default_value_t = 30)]
    since_days: i64,
}

impl Scope {
    fn label(&self) -> Option<String> {
        (!self.branches.is_empty()).then(|| self.branches.join(", "))
    }

    fn fetch_scope(&self, since: DateTime<Utc>) -> FetchScope {
        FetchScope {
            since: Some(since),
            branches: (!self.branches.is_empty()).then(|| self.branches.clone()),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import quality checks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    #[command(flatten)]
    Query(QueryCommand),
}

/// Subcommands that read quality checks through the engine.
#[derive(Subcommand)]
enum QueryCommand {
    /// Grouped statistics for filtered checks
    Stats {
        #[command(flatten)]
        scope: Scope,
        /// branch, chef or dish
        #[arg(long, default_value = "branch")]
        by: GroupKey,
        /// Case-insensitive part of the chef name
        #[arg(long)]
        chef: Option<String>,
        #[arg(long)]
        dish: Option<String>,
        #[arg(long)]
        status: Option<CheckStatus>,
        #[arg(long)]
        score_min: Option<u8>,
        #[arg(long)]
        score_max: Option<u8>,
        #[arg(long)]
        low_only: bool,
    },
    /// Best or worst groups by average score
    Rank {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "branch")]
        by: GroupKey,
        #[arg(long)]
        worst: bool,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Overrides the configured minimum sample size
        #[arg(long)]
        min_samples: Option<usize>,
    },
    /// Current window against the previous one, per group
    Trend {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "branch")]
        by: GroupKey,
        /// Overrides the configured window length
        #[arg(long)]
        window_days: Option<i64>,
    },
    /// Open low-score alerts
    Alerts {
        #[command(flatten)]
        scope: Scope,
        /// Overrides the configured lookback
        #[arg(long)]
        days: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// How often each score was given
    Distribution {
        #[command(flatten)]
        scope: Scope,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the JSON payload for the narrative summary service
    Insights {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "insights.json")]
        out: PathBuf,
    },
    /// Refresh the headline numbers periodically
    Watch {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value_t = 5)]
        refresh_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_app_config().context("invalid configuration")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let database_url = config
        .require_database_url()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            tracing::info!(inserted, path = %csv.display(), "csv import finished");
            println!("Inserted {inserted} checks from {}.", csv.display());
        }
        Commands::Query(command) => {
            let settings = load_engine_settings(&pool, &config.engine).await?;
            run_query(&pool, &settings, command).await?;
        }
    }

    Ok(())
}

async fn load_engine_settings(pool: &PgPool, base: &EngineSettings) -> anyhow::Result<EngineSettings> {
    let stored = db::fetch_settings(pool).await?;
    let settings = apply_stored_settings(base, &stored).context("invalid value in settings table")?;
    tracing::debug!(?settings, "engine settings resolved");
    Ok(settings)
}

async fn fetch(pool: &PgPool, scope: &Scope, since: DateTime<Utc>) -> anyhow::Result<Vec<QualityCheck>> {
    let records = db::fetch_checks(pool, &scope.fetch_scope(since)).await?;
    tracing::info!(count = records.len(), since = %since, "loaded quality checks");
    Ok(records)
}

fn days_back(days: i64) -> Result<DateTime<Utc>, EngineError> {
    Ok(AggregationWindow::trailing(Utc::now(), days)?.start)
}

/// Earliest timestamp a dashboard reads: two trend windows and the alert lookback.
fn dashboard_since(settings: &EngineSettings) -> Result<DateTime<Utc>, EngineError> {
    let trend_start = AggregationWindow::trailing(Utc::now(), settings.trend_window_days)?
        .previous()
        .start;
    Ok(trend_start.min(days_back(settings.alert_window_days)?))
}

async fn run_query(
    pool: &PgPool,
    settings: &EngineSettings,
    command: QueryCommand,
) -> anyhow::Result<()> {
    let threshold = settings.alert_threshold;

    match command {
        QueryCommand::Stats {
            scope,
            by,
            chef,
            dish,
            status,
            score_min,
            score_max,
            low_only,
        } => {
            let filter = RecordFilter {
                chef_name_contains: chef,
                dish_name: dish,
                status,
                score_min,
                score_max,
                low_scores_only: low_only,
                ..RecordFilter::default()
            };
            filter.validate()?;

            let records = fetch(pool, &scope, days_back(scope.since_days)?).await?;
            let matching = filter_records(&records, &filter, threshold)?;
            let stats = aggregate_by(&matching, by);

            if stats.is_empty() {
                println!("No checks found for this window.");
                return Ok(());
            }

            println!("Scores by {by} ({} checks):", matching.len());
            for (key, s) in &stats {
                println!(
                    "- {key}: avg {:.2}, min {}, max {}, sd {:.2} across {} checks",
                    s.mean, s.min, s.max, s.stddev, s.count
                );
            }
        }
        QueryCommand::Rank {
            scope,
            by,
            worst,
            limit,
            min_samples,
        } => {
            let records = fetch(pool, &scope, days_back(scope.since_days)?).await?;
            let stats = aggregate_by(&records, by);
            let order = if worst { RankOrder::Worst } else { RankOrder::Best };
            let min_samples = min_samples.unwrap_or(settings.min_group_samples);
            let ranked = rank_groups(&stats, order, min_samples, limit);

            if ranked.is_empty() {
                println!("No {by} has at least {min_samples} checks in this window.");
                return Ok(());
            }

            let label = if worst { "Lowest" } else { "Highest" };
            println!("{label} scoring by {by}:");
            for group in &ranked {
                println!(
                    "{}. {} avg {:.2} across {} checks",
                    group.rank, group.key, group.stats.mean, group.stats.count
                );
            }
        }
        QueryCommand::Trend {
            scope,
            by,
            window_days,
        } => {
            let days = window_days.unwrap_or(settings.trend_window_days);
            let window = AggregationWindow::trailing(Utc::now(), days)?;
            let records = fetch(pool, &scope, window.previous().start).await?;

            let current = aggregate_by(&window.select(&records), by);
            let previous = aggregate_by(&window.previous().select(&records), by);
            let trends = compute_group_trends(&current, &previous, settings.trend_dead_band)?;

            if trends.is_empty() {
                println!("No checks in the last {days} days.");
                return Ok(());
            }

            println!("{by} averages, last {days} days vs the {days} before:");
            for (key, trend) in &trends {
                println!(
                    "- {key}: {:.2} ({} {:+.2}, {:+.1}%) across {} checks",
                    trend.mean.current,
                    trend.mean.direction.as_str(),
                    trend.mean.delta,
                    trend.mean.percentage,
                    trend.stats.count
                );
            }
        }
        QueryCommand::Alerts {
            scope,
            days,
            limit,
            severity,
        } => {
            let mut query = AlertQuery::from_settings(settings, Utc::now());
            query.window_days = days.unwrap_or(query.window_days);
            query.limit = limit.unwrap_or(query.limit);
            query.severity = severity;

            let records = fetch(pool, &scope, days_back(query.window_days)?).await?;
            let alerts = find_low_score_alerts(&records, &query)?;

            if alerts.is_empty() {
                println!("No open low-score alerts.");
                return Ok(());
            }

            for alert in &alerts {
                let check = &alert.check;
                println!(
                    "- [{}] {} {} at {}: {} scored {}/10 ({})",
                    alert.severity,
                    check.created_at.format("%Y-%m-%d %H:%M"),
                    check.chef_name,
                    check.branch_name,
                    check.dish_name,
                    check.overall_score,
                    check.status
                );
            }
        }
        QueryCommand::Distribution { scope } => {
            let records = fetch(pool, &scope, days_back(scope.since_days)?).await?;
            let buckets = score_distribution(&records);

            if buckets.is_empty() {
                println!("No checks found for this window.");
                return Ok(());
            }

            for bucket in &buckets {
                println!(
                    "{:>2}: {:>4} ({:.1}%)",
                    bucket.score, bucket.count, bucket.percentage
                );
            }
        }
        QueryCommand::Report { scope, out } => {
            let records = fetch(pool, &scope, dashboard_since(settings)?).await?;
            let dashboard = report::build_dashboard(&records, settings, Utc::now())?;
            let label = scope.label();
            std::fs::write(&out, report::build_report(label.as_deref(), &dashboard))?;
            println!("Report written to {}.", out.display());
        }
        QueryCommand::Insights { scope, out } => {
            let records = fetch(pool, &scope, dashboard_since(settings)?).await?;
            let dashboard = report::build_dashboard(&records, settings, Utc::now())?;
            let label = scope.label();
            let input = report::build_narrative_input(label.as_deref(), &dashboard);
            std::fs::write(&out, serde_json::to_vec_pretty(&input)?)?;
            println!("Insights payload written to {}.", out.display());
        }
        QueryCommand::Watch {
            scope,
            refresh_secs,
        } => watch(pool, settings, &scope, refresh_secs).await?,
    }

    Ok(())
}

async fn watch(
    pool: &PgPool,
    settings: &EngineSettings,
    scope: &Scope,
    refresh_secs: u64,
) -> anyhow::Result<()> {
    let mut cache: QueryCache<Vec<QualityCheck>> =
        QueryCache::new(StdDuration::from_secs(settings.cache_ttl_secs));
    let key = Fingerprint::of(&(
        &scope.branches,
        settings.trend_window_days,
        settings.alert_window_days,
    ))?;

    loop {
        let records = match cache.get(&key) {
            Some(records) => records,
            None => {
                let records = fetch(pool, scope, dashboard_since(settings)?).await?;
                cache.insert(key, records.clone());
                records
            }
        };

        let dashboard = report::build_dashboard(&records, settings, Utc::now())?;
        let summary = &dashboard.summary;
        println!(
            "{} checks={} avg={} low={} ({:.1}%) alerts={} trend={}",
            Utc::now().format("%H:%M:%S"),
            summary.total_checks,
            summary
                .average_score
                .map_or_else(|| "-".to_string(), |a| format!("{a:.2}")),
            summary.low_score_count,
            summary.low_score_percentage,
            dashboard.alerts.len(),
            dashboard.trend.average_score.direction.as_str()
        );

        tokio::time::sleep(StdDuration::from_secs(refresh_secs.max(1))).await;
    }
}
