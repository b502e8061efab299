use serde_json::Value;

use flowwatch_api::{Filter, FilterOp, QuerySpec, Record, ServiceError};

/// PostgREST query string for a spec: `select=*`, one `column=op.value` per
/// filter, then `order` and `limit`.
pub(crate) fn query_params(spec: &QuerySpec) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &spec.filters {
        params.push((filter.column.clone(), format!("{}.{}", filter.operator, filter_value(filter))));
    }
    if let Some(order) = &spec.order_by {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{dir}", order.column)));
    }
    if let Some(limit) = spec.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn filter_value(filter: &Filter) -> String {
    match (filter.operator, &filter.value) {
        (FilterOp::In, Value::Array(items)) => {
            let items: Vec<String> = items.iter().map(list_item).collect();
            format!("({})", items.join(","))
        }
        (FilterOp::In, single) => format!("({})", list_item(single)),
        (_, value) => scalar(value),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// `in.(..)` members containing reserved characters must be double-quoted.
fn list_item(value: &Value) -> String {
    let raw = scalar(value);
    if raw.contains([',', '(', ')', '"', ':']) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}

pub(crate) fn parse_rows(body: &str) -> Result<Vec<Record>, ServiceError> {
    Ok(serde_json::from_str(body)?)
}

/// Map a failed response onto an error kind; PostgREST bodies carry a
/// `message` field.
pub(crate) fn error_from_response(status: u16, body: &str) -> ServiceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    let message = format!("HTTP {status}: {message}");
    match status {
        401 | 403 => ServiceError::config(message),
        408 | 429 | 500..=599 => ServiceError::io(message),
        _ => ServiceError::new(message),
    }
}
