use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use flowwatch_api::{
    ChangeEvent, ChangeSubscription, DataService, OverflowPolicy, QuerySpec, Record, ServiceError,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryServiceConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

fn default_buffer() -> usize {
    4096
}

fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::BackPressure
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryServiceConfig {
    /// Per-collection cap; the oldest record is evicted past it. `0` disables
    /// the cap.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Размер буфера каждого подписчика.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            buffer: default_buffer(),
            overflow: default_overflow(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySubscription
// ═══════════════════════════════════════════════════════════════

pub struct MemorySubscription {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChangeSubscription for MemorySubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<ChangeEvent, ServiceError>>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await.map(Ok) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async { self.rx.close() })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryService
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Collection {
    records: Vec<Record>,
    subscribers: Vec<Subscriber>,
}

/// One change feed. Once its channel fills under back-pressure, every later
/// event goes through `spill`, drained in order by a forwarding task.
struct Subscriber {
    tx: mpsc::Sender<ChangeEvent>,
    spill: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl Subscriber {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn spill(&mut self, collection: &str, event: ChangeEvent) {
        let tx = &self.tx;
        let spill = self.spill.get_or_insert_with(|| {
            let (spill_tx, mut spill_rx) = mpsc::unbounded_channel::<ChangeEvent>();
            let tx = tx.clone();
            let name = collection.to_string();
            tracing::debug!(collection = %name, "subscriber channel full, spilling");
            tokio::spawn(async move {
                while let Some(ev) = spill_rx.recv().await {
                    if tx.send(ev).await.is_err() {
                        tracing::warn!(collection = %name, "subscriber closed during backpressure send");
                        return;
                    }
                }
            });
            spill_tx
        });
        // a failed send means the forwarder saw the receiver close
        let _ = spill.send(event);
    }
}

/// In-process data service: named collections plus a change feed per
/// collection.
///
/// Mutations go through `insert` / `update` / `delete`, which notify every
/// subscriber. `fail_queries` and `disconnect_all` simulate outages.
pub struct MemoryService {
    config: MemoryServiceConfig,
    collections: RwLock<HashMap<String, Collection>>,
    query_failure: RwLock<Option<String>>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new(MemoryServiceConfig::default())
    }
}

impl MemoryService {
    pub fn new(config: MemoryServiceConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
            query_failure: RwLock::new(None),
        }
    }

    /// Create (or replace the contents of) a collection without emitting events.
    pub async fn seed(&self, collection: &str, records: Vec<Record>) {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        entry.records = records;
        if self.config.max_records > 0 {
            let excess = entry.records.len().saturating_sub(self.config.max_records);
            entry.records.drain(..excess);
        }
    }

    /// Insert a record and notify subscribers. Ids must be unique.
    pub async fn insert(&self, collection: &str, record: Record) -> Result<(), ServiceError> {
        let id = record
            .id()
            .cloned()
            .ok_or_else(|| ServiceError::format_err("record has no id"))?;
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        if entry.records.iter().any(|r| r.has_id(&id)) {
            return Err(ServiceError::new(format!("duplicate id {id} in '{collection}'")));
        }
        if self.config.max_records > 0 && entry.records.len() >= self.config.max_records {
            entry.records.remove(0);
        }
        entry.records.push(record.clone());
        self.notify(collection, entry, ChangeEvent::Insert(record));
        Ok(())
    }

    /// Replace an existing record. Returns `false` (and emits nothing) when
    /// no record has that id.
    pub async fn update(&self, collection: &str, record: Record) -> Result<bool, ServiceError> {
        let id = record
            .id()
            .cloned()
            .ok_or_else(|| ServiceError::format_err("record has no id"))?;
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        let Some(slot) = entry.records.iter_mut().find(|r| r.has_id(&id)) else {
            return Ok(false);
        };
        *slot = record.clone();
        self.notify(collection, entry, ChangeEvent::Update(record));
        Ok(true)
    }

    /// Delete by id. Returns `false` (and emits nothing) when absent.
    pub async fn delete(&self, collection: &str, id: &Value) -> Result<bool, ServiceError> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        let before = entry.records.len();
        entry.records.retain(|r| !r.has_id(id));
        if entry.records.len() == before {
            return Ok(false);
        }
        self.notify(collection, entry, ChangeEvent::Delete { id: id.clone() });
        Ok(true)
    }

    /// Push a raw event to subscribers without touching stored records.
    pub async fn emit(&self, collection: &str, event: ChangeEvent) -> Result<(), ServiceError> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;
        self.notify(collection, entry, event);
        Ok(())
    }

    /// Make every subsequent query fail with an I/O error (`None` heals).
    pub async fn fail_queries(&self, reason: Option<String>) {
        *self.query_failure.write().await = reason;
    }

    /// End every open change feed, as if the connection dropped.
    pub async fn disconnect_all(&self) {
        let mut collections = self.collections.write().await;
        let dropped: usize = collections
            .values_mut()
            .map(|c| std::mem::take(&mut c.subscribers).len())
            .sum();
        tracing::debug!(dropped, "disconnected all subscribers");
    }

    /// Live subscribers of a collection.
    pub async fn subscriber_count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.subscribers.iter().filter(|sub| !sub.is_closed()).count())
            .unwrap_or(0)
    }

    pub async fn records(&self, collection: &str) -> Vec<Record> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    /// Send to all subscribers, pruning closed ones. Each subscriber sees
    /// events in emission order.
    fn notify(&self, collection: &str, entry: &mut Collection, event: ChangeEvent) {
        let mut i = 0;
        while i < entry.subscribers.len() {
            let sub = &mut entry.subscribers[i];
            if sub.is_closed() {
                entry.subscribers.swap_remove(i);
                continue;
            }
            if sub.spill.is_some() {
                sub.spill(collection, event.clone());
                i += 1;
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(ev)) => match self.config.overflow {
                    OverflowPolicy::Drop => {
                        tracing::warn!(collection, "subscriber channel full, dropping change");
                    }
                    OverflowPolicy::BackPressure => sub.spill(collection, ev),
                },
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    entry.subscribers.swap_remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }
}

fn not_found(collection: &str) -> ServiceError {
    ServiceError::new(format!("collection '{collection}' not found"))
}

impl DataService for MemoryService {
    fn query(&self, spec: &QuerySpec) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ServiceError>> + Send + '_>> {
        let spec = spec.clone();
        Box::pin(async move {
            if let Some(reason) = self.query_failure.read().await.clone() {
                return Err(ServiceError::io(reason));
            }
            spec.validate()?;
            let collections = self.collections.read().await;
            let entry = collections
                .get(&spec.collection)
                .ok_or_else(|| not_found(&spec.collection))?;
            Ok(spec.evaluate(&entry.records))
        })
    }

    fn subscribe(
        &self,
        collection: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChangeSubscription>, ServiceError>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
            let mut collections = self.collections.write().await;
            collections.entry(collection).or_default().subscribers.push(Subscriber { tx, spill: None });
            Ok(Box::new(MemorySubscription { rx }) as Box<dyn ChangeSubscription>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        Record::from_json(v).unwrap()
    }

    async fn service_with_flows() -> MemoryService {
        let svc = MemoryService::default();
        svc.seed("network_flows", vec![
            rec(json!({"id": 1, "timestamp": "2024-05-01T10:00:00", "attack_type": "DDoS"})),
            rec(json!({"id": 2, "timestamp": "2024-05-01T12:00:00", "attack_type": "C&C"})),
            rec(json!({"id": 3, "timestamp": "2024-05-01T11:00:00", "attack_type": "C&C"})),
        ]).await;
        svc
    }

    #[tokio::test]
    async fn test_query_applies_spec() {
        let svc = service_with_flows().await;
        let spec = QuerySpec::new("network_flows")
            .filter("attack_type", flowwatch_api::FilterOp::Eq, "C&C")
            .order_by("timestamp", false)
            .limit(1);
        let rows = svc.query(&spec).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_query_unknown_collection_fails() {
        let svc = MemoryService::default();
        let err = svc.query(&QuerySpec::new("nope")).await.unwrap_err();
        assert!(err.message().contains("nope"));
    }

    #[tokio::test]
    async fn test_fail_queries_toggle() {
        let svc = service_with_flows().await;
        svc.fail_queries(Some("service unavailable".into())).await;
        let err = svc.query(&QuerySpec::new("network_flows")).await.unwrap_err();
        assert!(err.is_transient());

        svc.fail_queries(None).await;
        assert_eq!(svc.query(&QuerySpec::new("network_flows")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mutations_reach_subscribers_in_order() {
        let svc = service_with_flows().await;
        let mut sub = svc.subscribe("network_flows").await.unwrap();

        svc.insert("network_flows", rec(json!({"id": 4}))).await.unwrap();
        assert!(svc.update("network_flows", rec(json!({"id": 1, "attack_type": "Okiru"}))).await.unwrap());
        assert!(!svc.update("network_flows", rec(json!({"id": 99}))).await.unwrap());
        assert!(svc.delete("network_flows", &json!(3)).await.unwrap());

        let kinds: Vec<_> = [
            sub.recv().await.unwrap().unwrap(),
            sub.recv().await.unwrap().unwrap(),
            sub.recv().await.unwrap().unwrap(),
        ]
        .iter()
        .map(|e| e.kind())
        .collect();
        use flowwatch_api::ChangeKind::*;
        assert_eq!(kinds, vec![Insert, Update, Delete]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let svc = service_with_flows().await;
        assert!(svc.insert("network_flows", rec(json!({"id": 1}))).await.is_err());
        assert!(svc.insert("network_flows", rec(json!({"attack_type": "x"}))).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_ends_feeds_and_prunes() {
        let svc = service_with_flows().await;
        let mut sub = svc.subscribe("network_flows").await.unwrap();
        assert_eq!(svc.subscriber_count("network_flows").await, 1);

        svc.disconnect_all().await;
        assert!(sub.recv().await.is_none());
        assert_eq!(svc.subscriber_count("network_flows").await, 0);
    }

    #[tokio::test]
    async fn test_zero_max_records_means_unbounded() {
        let svc = MemoryService::new(MemoryServiceConfig { max_records: 0, ..Default::default() });
        svc.seed("flows", vec![rec(json!({"id": 1}))]).await;
        svc.insert("flows", rec(json!({"id": 2}))).await.unwrap();
        svc.insert("flows", rec(json!({"id": 3}))).await.unwrap();
        assert_eq!(svc.records("flows").await.len(), 3);
    }

    #[tokio::test]
    async fn test_backpressure_keeps_order_past_full_buffer() {
        let svc = MemoryService::new(MemoryServiceConfig {
            buffer: 1,
            overflow: OverflowPolicy::BackPressure,
            ..Default::default()
        });
        svc.seed("flows", Vec::new()).await;
        let mut sub = svc.subscribe("flows").await.unwrap();

        for id in 1..=20 {
            svc.insert("flows", rec(json!({"id": id}))).await.unwrap();
        }
        let mut seen = Vec::new();
        for _ in 1..=20 {
            let ev = sub.recv().await.unwrap().unwrap();
            seen.push(ev.id().and_then(Value::as_i64).unwrap());
        }
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_drop_policy_discards_past_full_buffer() {
        let svc = MemoryService::new(MemoryServiceConfig {
            buffer: 2,
            overflow: OverflowPolicy::Drop,
            ..Default::default()
        });
        svc.seed("flows", Vec::new()).await;
        let mut sub = svc.subscribe("flows").await.unwrap();

        for id in 1..=5 {
            svc.insert("flows", rec(json!({"id": id}))).await.unwrap();
        }
        svc.disconnect_all().await;
        let mut seen = Vec::new();
        while let Some(ev) = sub.recv().await {
            seen.push(ev.unwrap().id().and_then(Value::as_i64).unwrap());
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_max_records_evicts_oldest() {
        let svc = MemoryService::new(MemoryServiceConfig { max_records: 2, ..Default::default() });
        svc.seed("flows", Vec::new()).await;
        for id in 1..=3 {
            svc.insert("flows", rec(json!({"id": id}))).await.unwrap();
        }
        let ids: Vec<_> = svc.records("flows").await.iter().map(|r| r.id().cloned()).collect();
        assert_eq!(ids, vec![Some(json!(2)), Some(json!(3))]);
    }
}
