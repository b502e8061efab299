use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{ChangeEvent, QuerySpec, Record, ServiceError};

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded канала подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): если канал полон, событие дропается с записью в лог.
    Drop,
    /// .send().await: ждать пока появится место (back-pressure).
    #[serde(alias = "backpressure")]
    BackPressure,
}

// ════════════════════════════════════════════════════════════════
//  Data Service Traits
// ════════════════════════════════════════════════════════════════

/// A live change stream for one collection.
///
/// Dropping the subscription releases it; `close` additionally lets the
/// implementation say goodbye to the backend.
pub trait ChangeSubscription: Send {
    /// Next event. `None` = stream ended (server closed / connection lost).
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<ChangeEvent, ServiceError>>> + Send + '_>>;

    /// Unsubscribe. Must be safe to call on an already-ended stream.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// The external data service: one-shot queries plus per-collection change feeds.
///
/// Passed explicitly (as `Arc<dyn DataService>`) to whoever needs it, so
/// tests can substitute the in-memory implementation.
pub trait DataService: Send + Sync {
    /// Run a single read: filters (AND) → order → limit.
    fn query(&self, spec: &QuerySpec) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ServiceError>> + Send + '_>>;

    /// Open a change feed for every insert/update/delete on `collection`.
    fn subscribe(
        &self,
        collection: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChangeSubscription>, ServiceError>> + Send + '_>>;
}
