use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use flowwatch_api::Record;

use crate::format::parse_timestamp;
use crate::fields;

/// Window in which a detection still counts as an active connection.
pub const ACTIVE_WINDOW_MINUTES: i64 = 5;

/// Headline numbers of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_attacks: usize,
    pub unique_attack_types: usize,
    pub last_detection: Option<DateTime<Utc>>,
    pub active_connections: usize,
}

impl Overview {
    pub fn compute(records: &[Record], now: DateTime<Utc>) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut types: Vec<&str> = records
            .iter()
            .filter_map(|r| r.get_str(fields::ATTACK_TYPE))
            .collect();
        types.sort_unstable();
        types.dedup();

        let detections: Vec<DateTime<Utc>> = records
            .iter()
            .filter_map(|r| r.get(fields::DETECTION_TIMESTAMP).and_then(parse_timestamp))
            .collect();
        let cutoff = now - Duration::minutes(ACTIVE_WINDOW_MINUTES);

        Self {
            total_attacks: records.len(),
            unique_attack_types: types.len(),
            last_detection: detections.iter().max().copied(),
            active_connections: detections.iter().filter(|ts| **ts > cutoff).count(),
        }
    }
}
