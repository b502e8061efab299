use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dashboard::Overview;
use flowwatch_api::DataService;
use live_query::{LiveQuery, QueryState, ReconnectPolicy};
use service_postgrest::PostgrestService;

use crate::config::{FlowwatchConfig, ViewConfig, WatchArgs};
use crate::error::CliError;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: WatchArgs) -> Result<(), CliError> {
    tracing::info!("flowwatch starting");

    let config = FlowwatchConfig::load(&args.source)?;
    tracing::info!(config = %args.source.config, service = ?config.service, views = config.views.len(), "loaded config");

    let service: Arc<dyn DataService> = Arc::new(PostgrestService::new(config.service.clone())?);
    let token = CancellationToken::new();

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for view in &config.views {
        view.spec
            .validate()
            .map_err(|e| CliError::Config { context: "view", detail: format!("'{}': {e}", view.name) })?;
        handles.push(spawn_view(view.clone(), service.clone(), config.reconnect.clone(), token.clone()));
        tracing::info!(view = %view.name, collection = %view.spec.collection, "watching view");
    }

    // --- Ожидание Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    token.cancel();

    for h in handles {
        match tokio::time::timeout(DRAIN_TIMEOUT, h).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "view task failed"),
            Err(_) => tracing::warn!("view task did not stop in time"),
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn spawn_view(
    view: ViewConfig,
    service: Arc<dyn DataService>,
    reconnect: ReconnectPolicy,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut live = LiveQuery::new(service).with_reconnect(reconnect);
        let mut rx = live.watch();

        let started = tokio::select! {
            _ = token.cancelled() => None,
            started = live.start(view.spec.clone()) => Some(started),
        };
        match started {
            None => {
                live.shutdown().await;
                return;
            }
            Some(Err(e)) => {
                tracing::error!(view = %view.name, error = %e, "view not started");
                return;
            }
            Some(Ok(())) => {}
        }

        let mut last = Summary::default();
        loop {
            let state = rx.borrow_and_update().clone();
            let summary = Summary::of(&state);
            if summary != last {
                log_summary(&view.name, &state, &summary);
                last = summary;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        live.shutdown().await;
        tracing::debug!(view = %view.name, "view stopped");
    })
}

/// What a log line reports; repeated identical lines are suppressed.
#[derive(Debug, Default, PartialEq)]
struct Summary {
    overview: Overview,
    loading: bool,
    subscribed: bool,
    error: Option<String>,
    subscription_error: Option<String>,
}

impl Summary {
    fn of(state: &QueryState) -> Self {
        Self {
            overview: Overview::compute(&state.data, chrono::Utc::now()),
            loading: state.loading,
            subscribed: state.subscribed,
            error: state.error.clone(),
            subscription_error: state.subscription_error.clone(),
        }
    }
}

fn log_summary(view: &str, state: &QueryState, summary: &Summary) {
    if let Some(err) = &summary.error {
        tracing::error!(view = %view, error = %err, "fetch failed");
    }
    if let Some(err) = &summary.subscription_error {
        tracing::warn!(view = %view, error = %err, "change feed degraded");
    }
    if summary.loading {
        tracing::info!(view = %view, "loading");
        return;
    }
    let o = &summary.overview;
    tracing::info!(
        view = %view,
        records = state.data.len(),
        total_attacks = o.total_attacks,
        attack_types = o.unique_attack_types,
        active = o.active_connections,
        last_detection = %o.last_detection.map(|ts| dashboard::format_timestamp(&ts)).unwrap_or_else(|| "-".into()),
        live = summary.subscribed,
        "view updated"
    );
}
