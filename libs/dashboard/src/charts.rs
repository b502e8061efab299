use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

use flowwatch_api::Record;

use crate::fields;
use crate::format::{connection_state_label, parse_timestamp};

/// One slice / bar of a categorical chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub count: usize,
}

/// Count occurrences preserving first-seen order.
fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<Bucket> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();
    for key in keys {
        match index.get(key) {
            Some(&i) => buckets[i].count += 1,
            None => {
                index.insert(key, buckets.len());
                buckets.push(Bucket { name: key.to_string(), count: 1 });
            }
        }
    }
    buckets
}

/// Records per `attack_type`; missing or empty types count as "Unknown".
pub fn attack_type_distribution(records: &[Record]) -> Vec<Bucket> {
    tally(records.iter().map(|r| {
        r.get_str(fields::ATTACK_TYPE)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }))
}

/// Records per connection-state label.
pub fn connection_state_distribution(records: &[Record]) -> Vec<Bucket> {
    tally(records.iter().map(|r| match r.get(fields::CONNECTION_STATE) {
        Some(serde_json::Value::String(s)) => connection_state_label(s),
        Some(serde_json::Value::Number(n)) => connection_state_label(&n.to_string()),
        _ => "Unknown",
    }))
}

/// One point of the hourly timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    /// Start of the UTC hour.
    pub hour: DateTime<Utc>,
    /// `M/D H:00`
    pub label: String,
    pub count: usize,
}

/// Records per UTC hour of `timestamp`, oldest first. Records without a
/// parseable timestamp are left out.
pub fn hourly_timeline(records: &[Record]) -> Vec<TimelinePoint> {
    let mut hours: HashMap<DateTime<Utc>, usize> = HashMap::new();
    for ts in records
        .iter()
        .filter_map(|r| r.get(fields::TIMESTAMP).and_then(parse_timestamp))
    {
        if let Some(hour) = truncate_to_hour(ts) {
            *hours.entry(hour).or_default() += 1;
        }
    }

    let mut points: Vec<TimelinePoint> = hours
        .into_iter()
        .map(|(hour, count)| TimelinePoint {
            label: format!("{}/{} {}:00", hour.month(), hour.day(), hour.hour()),
            hour,
            count,
        })
        .collect();
    points.sort_by_key(|p| p.hour);
    points
}

fn truncate_to_hour(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ts.with_minute(0)?.with_second(0)?.with_nanosecond(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        Record::from_json(v).unwrap()
    }

    #[test]
    fn test_attack_type_distribution_first_seen_order() {
        let records = vec![
            rec(json!({"id": 1, "attack_type": "C&C"})),
            rec(json!({"id": 2, "attack_type": "DDoS"})),
            rec(json!({"id": 3})),
            rec(json!({"id": 4, "attack_type": "C&C"})),
        ];
        let buckets = attack_type_distribution(&records);
        assert_eq!(
            buckets,
            vec![
                Bucket { name: "C&C".into(), count: 2 },
                Bucket { name: "DDoS".into(), count: 1 },
                Bucket { name: "Unknown".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_connection_state_distribution_uses_labels() {
        let records = vec![
            rec(json!({"id": 1, "connection_state": "REJ"})),
            rec(json!({"id": 2, "connection_state": "S0"})),
            rec(json!({"id": 3, "connection_state": "REJ"})),
            rec(json!({"id": 4})),
            rec(json!({"id": 5, "connection_state": 12})),
        ];
        let buckets = connection_state_distribution(&records);
        assert_eq!(buckets[0], Bucket { name: "Rejected".into(), count: 2 });
        assert_eq!(buckets[1], Bucket { name: "Unknown".into(), count: 2 });
        assert_eq!(buckets[2], Bucket { name: "Connection Reset".into(), count: 1 });
    }

    #[test]
    fn test_hourly_timeline_is_chronological() {
        let records = vec![
            rec(json!({"id": 1, "timestamp": "2024-05-02T00:10:00Z"})),
            rec(json!({"id": 2, "timestamp": "2024-05-01T23:59:59Z"})),
            rec(json!({"id": 3, "timestamp": "2024-05-02T00:45:00Z"})),
            rec(json!({"id": 4, "timestamp": "not a date"})),
        ];
        let points = hourly_timeline(&records);
        let summary: Vec<(&str, usize)> = points.iter().map(|p| (p.label.as_str(), p.count)).collect();
        assert_eq!(summary, vec![("5/1 23:00", 1), ("5/2 0:00", 2)]);
    }
}
