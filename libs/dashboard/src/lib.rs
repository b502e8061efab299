//! Dashboard derivations over a synchronized flow list: headline stats,
//! chart series, table paging/sorting and display formatting.

pub mod charts;
pub mod format;
pub mod overview;
pub mod table;

pub use charts::{attack_type_distribution, connection_state_distribution, hourly_timeline, Bucket, TimelinePoint};
pub use format::{connection_state_label, format_bytes, format_timestamp, parse_timestamp};
pub use overview::Overview;
pub use table::{distinct_values, FlowEndpoints, FlowRow, ListFilters, Pager, SortState};

use flowwatch_api::QuerySpec;

/// Field names of a network flow record.
pub mod fields {
    pub const COLLECTION: &str = "network_flows";
    pub const TIMESTAMP: &str = "timestamp";
    pub const DETECTION_TIMESTAMP: &str = "detection_timestamp";
    pub const ATTACK_TYPE: &str = "attack_type";
    pub const CONNECTION_STATE: &str = "connection_state";
    pub const CONNECTION_DURATION: &str = "connection_duration";
    pub const BYTES_SENT_BY_ORIGIN: &str = "bytes_sent_by_origin";
    pub const ORIGIN_PORT: &str = "origin_port";
    pub const DESTINATION_PORT: &str = "destination_port";
    pub const RAW_LOG_ENTRY: &str = "raw_log_entry";
}

pub const RECENT_LIMIT: usize = 5;

/// Five newest flows.
pub fn recent_attacks_spec() -> QuerySpec {
    QuerySpec::new(fields::COLLECTION)
        .order_by(fields::TIMESTAMP, false)
        .limit(RECENT_LIMIT)
}

/// Every flow, oldest first, for the timeline.
pub fn timeline_spec() -> QuerySpec {
    QuerySpec::new(fields::COLLECTION).order_by(fields::TIMESTAMP, true)
}

/// Every flow, unordered, for the overview and distributions.
pub fn all_flows_spec() -> QuerySpec {
    QuerySpec::new(fields::COLLECTION)
}

/// Default named views, used when the config declares none.
pub fn default_views() -> Vec<(&'static str, QuerySpec)> {
    vec![
        ("overview", all_flows_spec()),
        ("recent", recent_attacks_spec()),
        ("timeline", timeline_spec()),
        ("flows", ListFilters::default().to_spec(&SortState::default())),
    ]
}
