use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::{Record, ID_FIELD};
use crate::ServiceError;

/// Kind of change reported by the backend's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One notification from a collection's change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Record),
    /// New value of an existing record.
    Update(Record),
    /// Identifier of the removed record.
    Delete { id: Value },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Identifier of the record the event refers to, if it carries one.
    pub fn id(&self) -> Option<&Value> {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => r.id(),
            ChangeEvent::Delete { id } => Some(id),
        }
    }
}

/// Wire shape of a change notification.
///
/// Accepts both `{eventType, new, old}` and the realtime server's
/// `{type, record, old_record}` spelling.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "eventType", alias = "type")]
    pub event_type: ChangeKind,
    #[serde(default, rename = "new", alias = "record")]
    pub new: Option<Map<String, Value>>,
    #[serde(default, rename = "old", alias = "old_record")]
    pub old: Option<Map<String, Value>>,
}

impl TryFrom<ChangePayload> for ChangeEvent {
    type Error = ServiceError;

    fn try_from(payload: ChangePayload) -> Result<Self, Self::Error> {
        match payload.event_type {
            ChangeKind::Insert | ChangeKind::Update => {
                let record = payload
                    .new
                    .map(Record::new)
                    .ok_or_else(|| ServiceError::format_err(format!(
                        "{:?} change without new record", payload.event_type
                    )))?;
                Ok(if payload.event_type == ChangeKind::Insert {
                    ChangeEvent::Insert(record)
                } else {
                    ChangeEvent::Update(record)
                })
            }
            ChangeKind::Delete => {
                let id = payload
                    .old
                    .and_then(|mut old| old.remove(ID_FIELD))
                    .filter(|id| !id.is_null())
                    .ok_or_else(|| ServiceError::format_err("DELETE change without old id"))?;
                Ok(ChangeEvent::Delete { id })
            }
        }
    }
}

impl ChangeEvent {
    /// Decode a JSON change payload.
    pub fn from_payload(value: Value) -> Result<Self, ServiceError> {
        let payload: ChangePayload = serde_json::from_value(value)?;
        payload.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_event_type_spelling() {
        let ev = ChangeEvent::from_payload(json!({
            "eventType": "INSERT",
            "new": {"id": 5, "attack_type": "DDoS"},
            "old": {}
        }))
        .unwrap();
        assert_eq!(ev.kind(), ChangeKind::Insert);
        assert_eq!(ev.id(), Some(&json!(5)));
    }

    #[test]
    fn test_decode_realtime_spelling() {
        let ev = ChangeEvent::from_payload(json!({
            "type": "DELETE",
            "record": null,
            "old_record": {"id": "b7c1"}
        }))
        .unwrap();
        assert_eq!(ev, ChangeEvent::Delete { id: json!("b7c1") });
    }

    #[test]
    fn test_decode_rejects_incomplete_payloads() {
        let err = ChangeEvent::from_payload(json!({"eventType": "UPDATE"})).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);

        let err = ChangeEvent::from_payload(json!({"eventType": "DELETE", "old": {}})).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);

        assert!(ChangeEvent::from_payload(json!({"eventType": "TRUNCATE"})).is_err());
    }
}
