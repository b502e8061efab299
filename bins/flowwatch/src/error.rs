#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("view '{0}' not found")]
    UnknownView(String),

    #[error("service: {0}")]
    Service(#[from] flowwatch_api::ServiceError),

    #[error("{0}")]
    Sync(#[from] live_query::SyncError),

    #[error("view '{view}' failed: {detail}")]
    Fetch { view: String, detail: String },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
