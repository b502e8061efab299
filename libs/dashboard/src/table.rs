use serde::Serialize;
use serde_json::Value;

use flowwatch_api::{Filter, OrderBy, QuerySpec, Record};

use crate::fields;
use crate::format::{format_bytes, format_timestamp, parse_timestamp};

// ═══════════════════════════════════════════════════════════════
//  Paging
// ═══════════════════════════════════════════════════════════════

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Zero-based page cursor over an in-memory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub page: usize,
    pub page_size: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Self { page: 0, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self { page: 0, page_size: page_size.max(1) }
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size.max(1))
    }

    /// Rows of the current page; empty past the end.
    pub fn slice<'a>(&self, records: &'a [Record]) -> &'a [Record] {
        let size = self.page_size.max(1);
        let start = self.page.saturating_mul(size).min(records.len());
        let end = start.saturating_add(size).min(records.len());
        &records[start..end]
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self, total: usize) -> bool {
        self.page + 1 < self.page_count(total)
    }

    pub fn prev(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    pub fn next(&mut self, total: usize) {
        let last = self.page_count(total).saturating_sub(1);
        self.page = (self.page + 1).min(last);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sorting / filtering of the flows table
// ═══════════════════════════════════════════════════════════════

/// Column sort of the flows table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column: String,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        Self { column: fields::TIMESTAMP.to_string(), ascending: false }
    }
}

impl SortState {
    /// Same column flips direction; a new column starts ascending.
    pub fn toggle(&mut self, column: &str) {
        if self.column == column {
            self.ascending = !self.ascending;
        } else {
            self.column = column.to_string();
            self.ascending = true;
        }
    }

    /// Header marker for `column`, if it is the sorted one.
    pub fn arrow(&self, column: &str) -> Option<&'static str> {
        (self.column == column).then_some(if self.ascending { "↑" } else { "↓" })
    }

    pub fn order_by(&self) -> OrderBy {
        OrderBy { column: self.column.clone(), ascending: self.ascending }
    }
}

/// Dropdown filters of the flows table; empty means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub attack_type: Option<String>,
    pub connection_state: Option<String>,
}

impl ListFilters {
    pub fn to_spec(&self, sort: &SortState) -> QuerySpec {
        let mut spec = QuerySpec::new(fields::COLLECTION);
        spec.order_by = Some(sort.order_by());
        let selected = [
            (fields::ATTACK_TYPE, &self.attack_type),
            (fields::CONNECTION_STATE, &self.connection_state),
        ];
        for (column, value) in selected {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                spec.filters.push(Filter::eq(column, v));
            }
        }
        spec
    }
}

/// Distinct non-empty string values of `field`, first-seen order.
pub fn distinct_values(records: &[Record], field: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in records.iter().filter_map(|r| r.get_str(field)) {
        if !v.is_empty() && !out.iter().any(|seen| seen == v) {
            out.push(v.to_string());
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════
//  Endpoints
// ═══════════════════════════════════════════════════════════════

/// Source / destination of a flow.
///
/// IPs come from the tab-separated Zeek `raw_log_entry`: field 2 is
/// `id.orig_h`, field 4 is `id.resp_h` (`-` when the line is short). Field 3
/// is `id.orig_p`, the origin port, and is never shown as the destination
/// address. Ports come from their own record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEndpoints {
    pub source_ip: String,
    pub source_port: Option<String>,
    pub destination_ip: String,
    pub destination_port: Option<String>,
}

impl FlowEndpoints {
    pub fn from_record(record: &Record) -> Self {
        let raw = record.get_str(fields::RAW_LOG_ENTRY).unwrap_or("");
        let parts: Vec<&str> = raw.split('\t').collect();
        let ip = |i: usize| parts.get(i).map_or("-", |s| *s).to_string();
        Self {
            source_ip: ip(2),
            source_port: port(record.get(fields::ORIGIN_PORT)),
            destination_ip: ip(4),
            destination_port: port(record.get(fields::DESTINATION_PORT)),
        }
    }

    pub fn source(&self) -> String {
        format!("{}:{}", self.source_ip, self.source_port.as_deref().unwrap_or(""))
    }

    pub fn destination(&self) -> String {
        format!("{}:{}", self.destination_ip, self.destination_port.as_deref().unwrap_or(""))
    }
}

fn port(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Rows
// ═══════════════════════════════════════════════════════════════

/// Display-ready row of the flows table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRow {
    pub time: String,
    pub attack_type: String,
    pub source: String,
    pub destination: String,
    pub state: String,
    pub duration: String,
    pub bytes_sent: String,
}

impl FlowRow {
    pub fn from_record(record: &Record) -> Self {
        let endpoints = FlowEndpoints::from_record(record);
        let time = record
            .get(fields::TIMESTAMP)
            .and_then(parse_timestamp)
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_default();
        let duration = match record.get_f64(fields::CONNECTION_DURATION) {
            Some(secs) => format!("{secs:.6} s"),
            None => "0 s".to_string(),
        };
        let bytes = record
            .get(fields::BYTES_SENT_BY_ORIGIN)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Self {
            time,
            attack_type: record
                .get_str(fields::ATTACK_TYPE)
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown")
                .to_string(),
            source: endpoints.source(),
            destination: endpoints.destination(),
            state: record.get_str(fields::CONNECTION_STATE).unwrap_or("").to_string(),
            duration,
            bytes_sent: format_bytes(bytes),
        }
    }
}
