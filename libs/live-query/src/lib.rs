//! Live query synchronizer: a one-shot filtered/ordered/limited fetch kept
//! consistent with the collection's insert/update/delete feed.

pub mod apply;
pub mod error;
pub mod live;
pub mod reconnect;
pub mod state;

pub use apply::apply_event;
pub use error::SyncError;
pub use live::{observe, LiveQuery};
pub use reconnect::ReconnectPolicy;
pub use state::QueryState;
