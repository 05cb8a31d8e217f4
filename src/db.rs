use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{NewQualityCheck, QualityCheck};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_branch(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO kitchen_quality.branches (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name.trim())
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Insert a validated check. Returns `false` when `source_key` was already
/// imported.
pub async fn insert_check(
    pool: &PgPool,
    check: &QualityCheck,
    source_key: Option<&str>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO kitchen_quality.quality_checks
        (id, branch_id, chef_name, dish_name, overall_score,
         taste_score, appearance_score, temperature_score, prep_time_score, portion_size_score,
         notes, status, source_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(check.id)
    .bind(check.branch_id)
    .bind(&check.chef_name)
    .bind(&check.dish_name)
    .bind(i16::from(check.overall_score))
    .bind(check.details.taste.map(i16::from))
    .bind(check.details.appearance.map(i16::from))
    .bind(check.details.temperature.map(i16::from))
    .bind(check.details.prep_time.map(i16::from))
    .bind(check.details.portion_size.map(i16::from))
    .bind(&check.notes)
    .bind(check.status.as_str())
    .bind(source_key)
    .bind(check.created_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let checks = vec![
        ("seed-001", "Haifa", "Li", "Pad Thai", 9, Some(9), None, "open", 1),
        ("seed-002", "Haifa", "Zhang", "Gyoza", 3, Some(2), Some("Served lukewarm"), "open", 2),
        ("seed-003", "Herzliya", "Yun", "Beef Rice", 7, None, None, "resolved", 3),
        ("seed-004", "Herzliya", "Tang", "Salmon Maki", 5, Some(5), Some("Rice too dry"), "in_progress", 4),
        ("seed-005", "Savyon", "Wu", "Thai Salad", 8, Some(8), None, "closed", 9),
        ("seed-006", "Savyon", "Song", "Pad Thai", 6, None, None, "open", 10),
        ("seed-007", "Haifa", "Li", "Gyoza", 8, None, None, "resolved", 11),
    ];

    for (source_key, branch, chef, dish, overall, taste, notes, status, days_ago) in checks {
        let branch_id = upsert_branch(pool, branch).await?;
        let check = NewQualityCheck {
            branch_id,
            branch_name: branch.to_string(),
            chef_name: chef.to_string(),
            dish_name: dish.to_string(),
            overall_score: overall,
            taste,
            notes: notes.map(str::to_string),
            created_at: Some(now - Duration::days(days_ago)),
            status: Some(status.to_string()),
            ..NewQualityCheck::default()
        }
        .validate(now)
        .with_context(|| format!("invalid seed row {source_key}"))?;

        insert_check(pool, &check, Some(source_key)).await?;
    }

    tracing::info!("seed data inserted");
    Ok(())
}

/// What the caller is allowed and asking to see.
#[derive(Debug, Clone, Default)]
pub struct FetchScope {
    pub since: Option<DateTime<Utc>>,
    /// Branch names the caller may view; `None` means every branch.
    pub branches: Option<Vec<String>>,
}

#[derive(sqlx::FromRow)]
struct CheckRow {
    id: Uuid,
    branch_id: Uuid,
    branch_name: String,
    chef_name: String,
    dish_name: String,
    overall_score: i16,
    taste_score: Option<i16>,
    appearance_score: Option<i16>,
    temperature_score: Option<i16>,
    prep_time_score: Option<i16>,
    portion_size_score: Option<i16>,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckRow> for QualityCheck {
    type Error = anyhow::Error;

    fn try_from(row: CheckRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let check = NewQualityCheck {
            id: Some(row.id),
            branch_id: row.branch_id,
            branch_name: row.branch_name,
            chef_name: row.chef_name,
            dish_name: row.dish_name,
            overall_score: i64::from(row.overall_score),
            taste: row.taste_score.map(i64::from),
            appearance: row.appearance_score.map(i64::from),
            temperature: row.temperature_score.map(i64::from),
            prep_time: row.prep_time_score.map(i64::from),
            portion_size: row.portion_size_score.map(i64::from),
            notes: row.notes,
            created_at: Some(row.created_at),
            status: Some(row.status),
        }
        .validate(row.created_at)
        .with_context(|| format!("quality check {id} failed validation"))?;
        Ok(check)
    }
}

pub async fn fetch_checks(pool: &PgPool, scope: &FetchScope) -> anyhow::Result<Vec<QualityCheck>> {
    let mut query = String::from(
        "SELECT qc.id, qc.branch_id, b.name AS branch_name, qc.chef_name, qc.dish_name, \
         qc.overall_score, qc.taste_score, qc.appearance_score, qc.temperature_score, \
         qc.prep_time_score, qc.portion_size_score, qc.notes, qc.status, qc.created_at \
         FROM kitchen_quality.quality_checks qc \
         JOIN kitchen_quality.branches b ON b.id = qc.branch_id \
         WHERE b.is_active",
    );

    let mut next_param = 1;
    if scope.since.is_some() {
        query.push_str(&format!(" AND qc.created_at >= ${next_param}"));
        next_param += 1;
    }
    if scope.branches.is_some() {
        query.push_str(&format!(" AND b.name = ANY(${next_param})"));
    }
    query.push_str(" ORDER BY qc.created_at DESC");

    let mut rows = sqlx::query_as::<_, CheckRow>(&query);
    if let Some(since) = scope.since {
        rows = rows.bind(since);
    }
    if let Some(branches) = &scope.branches {
        rows = rows.bind(branches.clone());
    }

    let records = rows.fetch_all(pool).await?;
    let checks = records
        .into_iter()
        .map(QualityCheck::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing::debug!(count = checks.len(), "fetched quality checks");
    Ok(checks)
}

pub async fn fetch_settings(pool: &PgPool) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT key, value FROM kitchen_quality.settings")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        branch: String,
        chef_name: String,
        dish_name: String,
        overall_score: i64,
        taste_score: Option<i64>,
        appearance_score: Option<i64>,
        temperature_score: Option<i64>,
        prep_time_score: Option<i64>,
        portion_size_score: Option<i64>,
        notes: Option<String>,
        created_at: Option<DateTime<Utc>>,
        status: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("cannot open {}", csv_path.display()))?;
    let mut inserted = 0usize;
    let now = Utc::now();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let branch_id = upsert_branch(pool, &row.branch).await?;

        let check = NewQualityCheck {
            branch_id,
            branch_name: row.branch,
            chef_name: row.chef_name,
            dish_name: row.dish_name,
            overall_score: row.overall_score,
            taste: row.taste_score,
            appearance: row.appearance_score,
            temperature: row.temperature_score,
            prep_time: row.prep_time_score,
            portion_size: row.portion_size_score,
            notes: row.notes,
            created_at: row.created_at,
            status: row.status,
            id: None,
        }
        .validate(now)
        .with_context(|| format!("row {} of {}", line + 2, csv_path.display()))?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", check.id));

        if insert_check(pool, &check, Some(&source_key)).await? {
            inserted += 1;
        } else {
            tracing::debug!(source_key = %source_key, "row already imported, skipping");
        }
    }

    Ok(inserted)
}
