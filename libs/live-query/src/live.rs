use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowwatch_api::{ChangeSubscription, DataService, ErrorKind, QuerySpec};

use crate::apply::apply_event;
use crate::{QueryState, ReconnectPolicy, SyncError};

// ═══════════════════════════════════════════════════════════════
//  LiveQuery
// ═══════════════════════════════════════════════════════════════

/// Keeps one `QuerySpec`'s result list in sync with its collection's
/// change feed.
///
/// `start` fetches a snapshot and attaches exactly one change subscription;
/// `stop` (or dropping the `LiveQuery`) releases it. Consumers read the
/// current `QueryState` via `state()` or follow it with `watch()`.
pub struct LiveQuery {
    service: Arc<dyn DataService>,
    reconnect: ReconnectPolicy,
    state: Arc<watch::Sender<QueryState>>,
    active: Option<Active>,
}

struct Active {
    spec: QuerySpec,
    token: CancellationToken,
    pump: JoinHandle<()>,
}

impl LiveQuery {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            service,
            reconnect: ReconnectPolicy::default(),
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Spec of the active subscription, if any.
    pub fn spec(&self) -> Option<&QuerySpec> {
        self.active.as_ref().map(|a| &a.spec)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Follow state changes.
    pub fn watch(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Fetch `spec` and keep the result in sync.
    ///
    /// A spec structurally equal to the active one keeps the current
    /// subscription. A different spec tears the old subscription down before
    /// the new one is opened. Fetch and feed failures land in the state, not
    /// in the returned `Result`; only an invalid spec is rejected.
    pub async fn start(&mut self, spec: QuerySpec) -> Result<(), SyncError> {
        spec.validate().map_err(SyncError::InvalidSpec)?;

        if self.active.as_ref().is_some_and(|a| a.spec == spec) {
            tracing::debug!(collection = %spec.collection, "spec unchanged, keeping subscription");
            return Ok(());
        }
        self.stop();

        let token = CancellationToken::new();
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
            s.subscription_error = None;
        });

        // The pump attaches the feed on its own task: a slow or failing feed
        // never holds up the snapshot. Events delivered while the fetch is
        // outstanding are applied, then overwritten by it.
        let pump = Pump {
            service: self.service.clone(),
            spec: spec.clone(),
            policy: self.reconnect.clone(),
            state: self.state.clone(),
            token: token.clone(),
        };
        let pump = tokio::spawn(pump.run());
        self.active = Some(Active { spec: spec.clone(), token: token.clone(), pump });

        let result = self.service.query(&spec).await;
        self.state.send_if_modified(|s| {
            if token.is_cancelled() {
                return false;
            }
            match result {
                Ok(records) => {
                    tracing::debug!(collection = %spec.collection, records = records.len(), "initial fetch done");
                    s.data = records;
                }
                Err(e) => {
                    let err = SyncError::Fetch(e);
                    tracing::warn!(collection = %spec.collection, error = %err, "initial fetch failed");
                    s.error = Some(err.to_string());
                }
            }
            s.loading = false;
            true
        });
        Ok(())
    }

    /// Release the subscription. Idempotent.
    ///
    /// Once this returns no change event can touch the state again.
    pub fn stop(&mut self) {
        if let Some(active) = self.detach() {
            // the pump exits at its next await; dropping the handle detaches it
            drop(active.pump);
        }
    }

    /// `stop` and wait for the feed to be closed.
    pub async fn shutdown(mut self) {
        if let Some(active) = self.detach() {
            if let Err(e) = active.pump.await {
                tracing::warn!(error = %e, "change feed task failed");
            }
        }
    }

    fn detach(&mut self) -> Option<Active> {
        let active = self.active.take()?;
        // Cancel under the state lock: an apply that is already running
        // finishes before this returns, later ones see the token.
        self.state.send_if_modified(|s| {
            active.token.cancel();
            let was_subscribed = s.subscribed || s.loading;
            s.subscribed = false;
            s.loading = false;
            was_subscribed
        });
        tracing::debug!(collection = %active.spec.collection, "live query stopped");
        Some(active)
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create a `LiveQuery` and start it.
pub async fn observe(service: Arc<dyn DataService>, spec: QuerySpec) -> Result<LiveQuery, SyncError> {
    let mut live = LiveQuery::new(service);
    live.start(spec).await?;
    Ok(live)
}

// ═══════════════════════════════════════════════════════════════
//  Pump: change feed → state
// ═══════════════════════════════════════════════════════════════

enum FeedEnd {
    Cancelled,
    Closed,
    Failed(flowwatch_api::ServiceError),
}

struct Pump {
    service: Arc<dyn DataService>,
    spec: QuerySpec,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<QueryState>>,
    token: CancellationToken,
}

impl Pump {
    async fn run(self) {
        let mut attempt: u32 = 0;
        let mut attached_before = false;
        loop {
            let subscribed = tokio::select! {
                _ = self.token.cancelled() => return,
                r = self.service.subscribe(&self.spec.collection) => r,
            };
            match subscribed {
                Ok(mut sub) => {
                    attempt = 0;
                    self.state.send_if_modified(|s| {
                        if self.token.is_cancelled() {
                            return false;
                        }
                        s.subscribed = true;
                        s.subscription_error = None;
                        true
                    });
                    if attached_before {
                        tracing::info!(collection = %self.spec.collection, "change feed reattached");
                    } else {
                        tracing::info!(collection = %self.spec.collection, "subscribed to change feed");
                    }
                    attached_before = true;

                    let end = self.drain(sub.as_mut()).await;
                    sub.close().await;
                    match end {
                        FeedEnd::Cancelled => return,
                        FeedEnd::Closed => self.report(SyncError::StreamClosed(self.spec.collection.clone())),
                        FeedEnd::Failed(e) => self.report(SyncError::Subscribe(e)),
                    }
                }
                Err(e) => self.report(SyncError::Subscribe(e)),
            }

            let Some(delay) = self.policy.delay(attempt) else {
                tracing::warn!(collection = %self.spec.collection, attempts = attempt, "change feed lost, not reconnecting");
                return;
            };
            attempt = attempt.saturating_add(1);
            tracing::info!(collection = %self.spec.collection, attempt, delay_ms = delay.as_millis() as u64, "reconnecting change feed");

            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn drain(&self, sub: &mut dyn ChangeSubscription) -> FeedEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return FeedEnd::Cancelled,
                next = sub.recv() => next,
            };
            match next {
                Some(Ok(event)) => {
                    let kind = event.kind();
                    let changed = self.state.send_if_modified(|s| {
                        if self.token.is_cancelled() {
                            return false;
                        }
                        apply_event(&mut s.data, &event, &self.spec)
                    });
                    tracing::trace!(collection = %self.spec.collection, ?kind, changed, "applied change");
                }
                Some(Err(e)) if e.kind() == ErrorKind::Format => {
                    tracing::warn!(collection = %self.spec.collection, error = %e, "skipping malformed change");
                }
                Some(Err(e)) => return FeedEnd::Failed(e),
                None => return FeedEnd::Closed,
            }
        }
    }

    fn report(&self, err: SyncError) {
        tracing::warn!(collection = %self.spec.collection, error = %err, "change feed error");
        self.state.send_if_modified(|s| {
            if self.token.is_cancelled() {
                return false;
            }
            s.subscribed = false;
            s.subscription_error = Some(err.to_string());
            true
        });
    }
}
