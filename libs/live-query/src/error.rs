use flowwatch_api::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid query: {0}")]
    InvalidSpec(ServiceError),

    #[error("fetch failed: {0}")]
    Fetch(ServiceError),

    #[error("subscription failed: {0}")]
    Subscribe(ServiceError),

    #[error("change feed for '{0}' closed")]
    StreamClosed(String),
}
