use flowwatch_api::{ChangeEvent, InsertAdmission, QuerySpec, Record};
use serde_json::Value;

/// Apply one change event to a synchronized list.
///
/// Pure list transformation: never touches the backend. Returns `true`
/// when `data` was modified.
///
/// - Insert: prepend, re-sort by `order_by`, truncate to `limit`. Filters
///   are only consulted under `InsertAdmission::Filtered`. An insert for an
///   id already in the list replaces the old entry.
/// - Update: replace the record with the same id in place; unknown id is a
///   no-op.
/// - Delete: remove the record with that id; unknown id is a no-op.
pub fn apply_event(data: &mut Vec<Record>, event: &ChangeEvent, spec: &QuerySpec) -> bool {
    match event {
        ChangeEvent::Insert(record) => insert(data, record, spec),
        ChangeEvent::Update(record) => update(data, record),
        ChangeEvent::Delete { id } => delete(data, id),
    }
}

fn insert(data: &mut Vec<Record>, record: &Record, spec: &QuerySpec) -> bool {
    if spec.admission == InsertAdmission::Filtered && !spec.matches(record) {
        return false;
    }
    if let Some(id) = record.id() {
        data.retain(|r| !r.has_id(id));
    }
    data.insert(0, record.clone());
    if let Some(order) = &spec.order_by {
        order.sort(data);
    }
    if let Some(limit) = spec.limit {
        data.truncate(limit);
    }
    true
}

fn update(data: &mut [Record], record: &Record) -> bool {
    let Some(id) = record.id() else { return false };
    match data.iter_mut().find(|r| r.has_id(id)) {
        Some(slot) => {
            *slot = record.clone();
            true
        }
        None => false,
    }
}

fn delete(data: &mut Vec<Record>, id: &Value) -> bool {
    let before = data.len();
    data.retain(|r| !r.has_id(id));
    data.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowwatch_api::FilterOp;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        Record::from_json(v).unwrap()
    }

    fn ids(data: &[Record]) -> Vec<i64> {
        data.iter().filter_map(|r| r.id().and_then(Value::as_i64)).collect()
    }

    fn flow(id: i64, ts: &str) -> Record {
        rec(json!({"id": id, "timestamp": ts, "attack_type": "DDoS"}))
    }

    #[test]
    fn test_insert_prepends_without_order() {
        let spec = QuerySpec::new("network_flows");
        let mut data = vec![flow(1, "a"), flow(2, "b")];
        assert!(apply_event(&mut data, &ChangeEvent::Insert(flow(3, "c")), &spec));
        assert_eq!(ids(&data), vec![3, 1, 2]);
    }

    #[test]
    fn test_recent_attacks_scenario() {
        let spec = QuerySpec::new("network_flows").order_by("timestamp", false).limit(5);
        let mut data = vec![
            flow(5, "2024-05-01T10:05:00"),
            flow(4, "2024-05-01T10:04:00"),
            flow(3, "2024-05-01T10:03:00"),
            flow(2, "2024-05-01T10:02:00"),
            flow(1, "2024-05-01T10:01:00"),
        ];
        apply_event(&mut data, &ChangeEvent::Insert(flow(6, "2024-05-01T10:06:00")), &spec);
        assert_eq!(ids(&data), vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_insert_respects_order_and_limit_over_many_events() {
        let spec = QuerySpec::new("network_flows").order_by("bytes", true).limit(4);
        let mut data = Vec::new();
        for (i, bytes) in [50, 10, 90, 30, 70, 20, 60, 40].into_iter().enumerate() {
            let ev = ChangeEvent::Insert(rec(json!({"id": i, "bytes": bytes})));
            apply_event(&mut data, &ev, &spec);
            assert!(data.len() <= 4);
            let seen: Vec<i64> = data.iter().filter_map(|r| r.get("bytes").and_then(Value::as_i64)).collect();
            let mut sorted = seen.clone();
            sorted.sort();
            assert_eq!(seen, sorted);
        }
        assert_eq!(ids(&data), vec![1, 5, 3, 7]);
    }

    #[test]
    fn test_string_and_numeric_ids_stay_distinct() {
        let spec = QuerySpec::new("network_flows");
        let mut data = vec![rec(json!({"id": 7, "attack_type": "DDoS"}))];

        assert!(apply_event(&mut data, &ChangeEvent::Insert(rec(json!({"id": "7"}))), &spec));
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].id(), Some(&json!("7")));
        assert_eq!(data[1].id(), Some(&json!(7)));

        assert!(apply_event(&mut data, &ChangeEvent::Delete { id: json!(7) }, &spec));
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id(), Some(&json!("7")));

        let update = ChangeEvent::Update(rec(json!({"id": 7, "attack_type": "C&C"})));
        assert!(!apply_event(&mut data, &update, &spec));
        assert_eq!(data[0].id(), Some(&json!("7")));
    }

    #[test]
    fn test_insert_ignores_filters_by_default() {
        let spec = QuerySpec::new("network_flows").filter("attack_type", FilterOp::Eq, "C&C");
        let mut data = Vec::new();
        assert!(apply_event(&mut data, &ChangeEvent::Insert(flow(1, "t")), &spec));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_filtered_admission_rejects_non_matching() {
        let spec = QuerySpec::new("network_flows")
            .filter("attack_type", FilterOp::Eq, "C&C")
            .admission(InsertAdmission::Filtered);
        let mut data = Vec::new();
        assert!(!apply_event(&mut data, &ChangeEvent::Insert(flow(1, "t")), &spec));
        assert!(data.is_empty());

        let cc = rec(json!({"id": 2, "attack_type": "C&C"}));
        assert!(apply_event(&mut data, &ChangeEvent::Insert(cc), &spec));
        assert_eq!(ids(&data), vec![2]);
    }

    #[test]
    fn test_insert_with_known_id_keeps_ids_unique() {
        let spec = QuerySpec::new("network_flows");
        let mut data = vec![flow(1, "a"), flow(2, "b")];
        apply_event(&mut data, &ChangeEvent::Insert(flow(2, "z")), &spec);
        assert_eq!(ids(&data), vec![2, 1]);
        assert_eq!(data[0].get_str("timestamp"), Some("z"));
    }

    #[test]
    fn test_update_replaces_in_place() {
        let spec = QuerySpec::new("network_flows").order_by("timestamp", true);
        let mut data = vec![flow(1, "a"), flow(2, "b"), flow(3, "c")];
        let changed = apply_event(&mut data, &ChangeEvent::Update(flow(2, "zzz")), &spec);
        assert!(changed);
        // position is stable even though the new value would sort last
        assert_eq!(ids(&data), vec![1, 2, 3]);
        assert_eq!(data[1].get_str("timestamp"), Some("zzz"));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let spec = QuerySpec::new("network_flows");
        let mut data = vec![flow(1, "a"), flow(2, "b")];
        let before = data.clone();
        assert!(!apply_event(&mut data, &ChangeEvent::Update(flow(9, "x")), &spec));
        assert_eq!(data, before);
    }

    #[test]
    fn test_delete_removes_and_is_idempotent() {
        let spec = QuerySpec::new("network_flows");
        let mut data = vec![rec(json!({"id": 1})), rec(json!({"id": 2})), rec(json!({"id": 3}))];
        let ev = ChangeEvent::Delete { id: json!(3) };

        assert!(apply_event(&mut data, &ev, &spec));
        assert_eq!(ids(&data), vec![1, 2]);

        let once = data.clone();
        assert!(!apply_event(&mut data, &ev, &spec));
        assert_eq!(data, once);
    }
}
