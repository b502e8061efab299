use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{compare_values, values_equal, Record};
use crate::ServiceError;

// ════════════════════════════════════════════════════════════════
//  Filters
// ════════════════════════════════════════════════════════════════

/// Predicate operator. Names follow the PostgREST query grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    #[serde(alias = "i_like")]
    ILike,
    Is,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::Is => "is",
            FilterOp::In => "in",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(column, operator, value)`. All filters of a spec are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOp, value: impl Into<Value>) -> Self {
        Self { column: column.into(), operator, value: value.into() }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    /// Evaluate the predicate against one record, the way the backend would.
    pub fn matches(&self, record: &Record) -> bool {
        let field = record.get(&self.column);
        let present = field.filter(|v| !v.is_null());
        match self.operator {
            FilterOp::Eq => present.is_some_and(|v| values_equal(v, &self.value)),
            FilterOp::Neq => present.is_some_and(|v| !values_equal(v, &self.value)),
            FilterOp::Gt => self.ordered(present, |o| o == Ordering::Greater),
            FilterOp::Gte => self.ordered(present, |o| o != Ordering::Less),
            FilterOp::Lt => self.ordered(present, |o| o == Ordering::Less),
            FilterOp::Lte => self.ordered(present, |o| o != Ordering::Greater),
            FilterOp::Like => self.like(present, false),
            FilterOp::ILike => self.like(present, true),
            FilterOp::Is => match &self.value {
                Value::Null => present.is_none(),
                Value::String(s) if s.eq_ignore_ascii_case("null") => present.is_none(),
                other => present.is_some_and(|v| v == other),
            },
            FilterOp::In => match &self.value {
                Value::Array(options) => {
                    present.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
                }
                single => present.is_some_and(|v| values_equal(v, single)),
            },
        }
    }

    fn ordered(&self, field: Option<&Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        let Some(field) = field else { return false };
        // Numeric string filter values compare against numeric fields as numbers.
        let target = match (field, &self.value) {
            (Value::Number(_), Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n).map(Value::Number),
                Err(_) => None,
            },
            _ => None,
        };
        let target = target.as_ref().unwrap_or(&self.value);
        accept(compare_values(Some(field), Some(target)))
    }

    fn like(&self, field: Option<&Value>, case_insensitive: bool) -> bool {
        match (field.and_then(Value::as_str), self.value.as_str()) {
            (Some(text), Some(pattern)) => like_match(text, pattern, case_insensitive),
            _ => false,
        }
    }
}

/// SQL LIKE: `%` (or PostgREST's `*`) matches any run, `_` one character.
fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let norm = |s: &str| -> Vec<char> {
        if case_insensitive {
            s.to_lowercase().chars().collect()
        } else {
            s.chars().collect()
        }
    };
    let text = norm(text);
    let pattern = norm(pattern);

    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') | Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%' || *c == '*')
}

// ════════════════════════════════════════════════════════════════
//  Ordering
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }

    /// Direct comparison of the ordering column, no secondary key.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = compare_values(a.get(&self.column), b.get(&self.column));
        if self.ascending { ord } else { ord.reverse() }
    }

    /// Stable in-place sort.
    pub fn sort(&self, records: &mut [Record]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

// ════════════════════════════════════════════════════════════════
//  QuerySpec
// ════════════════════════════════════════════════════════════════

/// Пропускать ли live insert'ы через фильтры исходного запроса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertAdmission {
    /// Every inserted record enters the list; filters apply to the initial
    /// fetch only.
    #[default]
    Unfiltered,
    /// Inserted records must satisfy all filters to enter the list.
    Filtered,
}

/// Immutable description of how to fetch and maintain a record list.
///
/// Two specs are the same subscription iff they are structurally equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub admission: InsertAdmission,
}

impl QuerySpec {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            admission: InsertAdmission::default(),
        }
    }

    pub fn filter(mut self, column: impl Into<String>, operator: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(column, operator, value));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy { column: column.into(), ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn admission(mut self, admission: InsertAdmission) -> Self {
        self.admission = admission;
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.collection.trim().is_empty() {
            return Err(ServiceError::config("collection name must not be empty"));
        }
        if let Some(order) = &self.order_by {
            if order.column.trim().is_empty() {
                return Err(ServiceError::config("order_by column must not be empty"));
            }
        }
        if let Some(f) = self.filters.iter().find(|f| f.column.trim().is_empty()) {
            return Err(ServiceError::config(format!(
                "filter '{}' has an empty column", f.operator
            )));
        }
        Ok(())
    }

    /// True when the record satisfies every filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Filters → order → limit over an in-memory collection.
    pub fn evaluate<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<Record> {
        let mut out: Vec<Record> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        if let Some(order) = &self.order_by {
            order.sort(&mut out);
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        Record::from_json(v).unwrap()
    }

    #[test]
    fn test_filter_operators() {
        let r = rec(json!({
            "id": 1,
            "attack_type": "C&C-HeartBeat",
            "connection_state": "REJ",
            "bytes_sent_by_origin": 512,
            "label": null
        }));

        assert!(Filter::eq("connection_state", "REJ").matches(&r));
        assert!(!Filter::new("connection_state", FilterOp::Neq, "REJ").matches(&r));
        assert!(Filter::new("bytes_sent_by_origin", FilterOp::Gt, 100).matches(&r));
        assert!(Filter::new("bytes_sent_by_origin", FilterOp::Lte, "512").matches(&r));
        assert!(!Filter::new("bytes_sent_by_origin", FilterOp::Lt, 512).matches(&r));
        assert!(Filter::new("attack_type", FilterOp::Like, "C&C%").matches(&r));
        assert!(!Filter::new("attack_type", FilterOp::Like, "c&c%").matches(&r));
        assert!(Filter::new("attack_type", FilterOp::ILike, "*heartbeat").matches(&r));
        assert!(Filter::new("label", FilterOp::Is, Value::Null).matches(&r));
        assert!(Filter::new("missing", FilterOp::Is, "null").matches(&r));
        assert!(Filter::new("connection_state", FilterOp::In, json!(["S0", "REJ"])).matches(&r));
        assert!(!Filter::eq("missing", "x").matches(&r));
        assert!(!Filter::new("missing", FilterOp::Neq, "x").matches(&r));
    }

    #[test]
    fn test_like_match_wildcards() {
        assert!(like_match("PartOfAHorizontalPortScan", "%Port%", false));
        assert!(like_match("DDoS", "DD_S", false));
        assert!(!like_match("DDoS", "DD_", false));
        assert!(like_match("", "%", false));
        assert!(like_match("abcabd", "%abd", false));
    }

    #[test]
    fn test_evaluate_filters_orders_limits() {
        let rows = vec![
            rec(json!({"id": 1, "ts": 10, "t": "a"})),
            rec(json!({"id": 2, "ts": 30, "t": "b"})),
            rec(json!({"id": 3, "ts": 20, "t": "a"})),
            rec(json!({"id": 4, "ts": 40, "t": "a"})),
        ];
        let spec = QuerySpec::new("flows")
            .filter("t", FilterOp::Eq, "a")
            .order_by("ts", false)
            .limit(2);
        let ids: Vec<_> = spec.evaluate(&rows).iter().map(|r| r.id().cloned()).collect();
        assert_eq!(ids, vec![Some(json!(4)), Some(json!(3))]);
    }

    #[test]
    fn test_validate_rejects_empty_collection() {
        assert!(QuerySpec::new("  ").validate().is_err());
        assert!(QuerySpec::new("network_flows").validate().is_ok());
        assert!(QuerySpec::new("network_flows").order_by("", true).validate().is_err());
    }

    #[test]
    fn test_spec_structural_identity() {
        let a = QuerySpec::new("network_flows").order_by("timestamp", false).limit(5);
        let b = QuerySpec::new("network_flows").order_by("timestamp", false).limit(5);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().limit(6));
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "collection": "network_flows",
            "order_by": {"column": "timestamp", "ascending": false},
            "filters": [{"column": "attack_type", "operator": "eq", "value": "C&C"}]
        }))
        .unwrap();
        assert_eq!(spec.limit, None);
        assert_eq!(spec.admission, InsertAdmission::Unfiltered);
        assert_eq!(spec.filters[0].operator, FilterOp::Eq);
    }
}
