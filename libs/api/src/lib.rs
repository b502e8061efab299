//! Shared types and collaborator traits for flowwatch: records, query
//! definitions, change events and the `DataService` seam.

pub mod error;
pub mod event;
pub mod query;
pub mod record;
pub mod service;
pub mod util;

pub use error::{ErrorKind, ServiceError};
pub use event::{ChangeEvent, ChangeKind, ChangePayload};
pub use query::{Filter, FilterOp, InsertAdmission, OrderBy, QuerySpec};
pub use record::{compare_values, ids_equal, values_equal, Record, ID_FIELD};
pub use service::{ChangeSubscription, DataService, OverflowPolicy};
pub use util::resolve_path;
