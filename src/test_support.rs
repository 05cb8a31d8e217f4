use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{CheckStatus, DetailScores, QualityCheck};

pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

/// Deterministic branch ids so grouping by id and by name agree.
pub fn branch_id(name: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    for (slot, b) in bytes.iter_mut().zip(name.bytes()) {
        *slot = b;
    }
    Uuid::from_bytes(bytes)
}

pub fn check(branch: &str, chef: &str, dish: &str, score: u8, hours_ago: i64) -> QualityCheck {
    QualityCheck {
        id: Uuid::new_v4(),
        branch_id: branch_id(branch),
        branch_name: branch.to_string(),
        chef_name: chef.to_string(),
        dish_name: dish.to_string(),
        overall_score: score,
        details: DetailScores::default(),
        notes: None,
        created_at: as_of() - Duration::hours(hours_ago),
        status: CheckStatus::Open,
    }
}

pub fn with_status(mut check: QualityCheck, status: CheckStatus) -> QualityCheck {
    check.status = status;
    check
}

pub fn sample_records() -> Vec<QualityCheck> {
    vec![
        check("Haifa", "Li", "Pad Thai", 9, 2),
        check("Haifa", "Zhang", "Gyoza", 3, 5),
        with_status(check("Haifa", "Li", "Gyoza", 5, 30), CheckStatus::Resolved),
        check("Herzliya", "Yun", "Pad Thai", 7, 10),
        with_status(check("Herzliya", "Tang", "Beef Rice", 8, 50), CheckStatus::InProgress),
        with_status(check("Savyon", "Wu", "Pad Thai", 6, 200), CheckStatus::Closed),
    ]
}
