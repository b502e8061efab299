use std::sync::Arc;

use serde::Serialize;

use dashboard::{Bucket, FlowRow, Overview, TimelinePoint};
use flowwatch_api::{DataService, Record};
use live_query::{observe, QueryState};
use service_postgrest::PostgrestService;

use crate::config::{FlowwatchConfig, SnapshotArgs};
use crate::error::CliError;

/// JSON printed by `flowwatch snapshot`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    view: &'a str,
    collection: &'a str,
    generated_at: chrono::DateTime<chrono::Utc>,
    overview: Overview,
    attack_types: Vec<Bucket>,
    connection_states: Vec<Bucket>,
    timeline: Vec<TimelinePoint>,
    rows: Vec<FlowRow>,
    records: &'a [Record],
}

pub async fn run(args: SnapshotArgs) -> Result<(), CliError> {
    let config = FlowwatchConfig::load(&args.source)?;
    let view = config.view(&args.view)?;

    let service: Arc<dyn DataService> = Arc::new(PostgrestService::new(config.service.clone())?);
    let live = observe(service, view.spec.clone()).await?;
    let state = live.state();
    live.shutdown().await;

    let QueryState { data, error, .. } = state;
    if let Some(detail) = error {
        return Err(CliError::Fetch { view: view.name.clone(), detail });
    }

    let now = chrono::Utc::now();
    let report = Report {
        view: &view.name,
        collection: &view.spec.collection,
        generated_at: now,
        overview: Overview::compute(&data, now),
        attack_types: dashboard::attack_type_distribution(&data),
        connection_states: dashboard::connection_state_distribution(&data),
        timeline: dashboard::hourly_timeline(&data),
        rows: data.iter().map(FlowRow::from_record).collect(),
        records: &data,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::debug!(view = %view.name, records = data.len(), "snapshot printed");
    Ok(())
}
