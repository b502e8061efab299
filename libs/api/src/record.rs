use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{resolve_path, ServiceError};

/// Имя поля-идентификатора записи.
pub const ID_FIELD: &str = "id";

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// One row of a collection: an opaque field → value mapping.
///
/// Only `id` is structurally meaningful to the synchronizer; everything else
/// (`attack_type`, `timestamp`, ...) is interpreted by the dashboard layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from a JSON object. Anything else is a format error.
    pub fn from_json(value: Value) -> Result<Self, ServiceError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ServiceError::format_err(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID_FIELD).filter(|v| !v.is_null())
    }

    /// True when this record's `id` equals `id`: numbers compare numerically,
    /// a string never equals a number.
    pub fn has_id(&self, id: &Value) -> bool {
        self.id().is_some_and(|own| ids_equal(own, id))
    }

    /// Field lookup; dotted names descend into nested objects.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(v) = self.0.get(field) {
            return Some(v);
        }
        let (head, rest) = field.split_once('.')?;
        resolve_path(self.0.get(head)?, rest)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = ServiceError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

// ════════════════════════════════════════════════════════════════
//  Value comparison
// ════════════════════════════════════════════════════════════════

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON values used for every sort in the workspace.
///
/// missing/null < bool < number < string < array < object. Numbers compare
/// numerically, strings lexicographically (ISO-8601 timestamps sort
/// chronologically this way). Arrays and objects of equal rank compare equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Identity comparison: `7` == `7.0`, but `"7"` never matches `7`.
pub fn ids_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Loose equality for filters: `1` == `1.0`, and a numeric string equals the number it
/// spells (filter values often arrive as strings from config or URLs).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}
