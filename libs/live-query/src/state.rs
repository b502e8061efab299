use flowwatch_api::Record;

/// What a consumer sees: the synchronized list plus fetch/feed status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// Synchronized list.
    pub data: Vec<Record>,
    /// True while the initial fetch is outstanding.
    pub loading: bool,
    /// Initial fetch failure, human-readable.
    pub error: Option<String>,
    /// Change feed failure; kept apart from `error`.
    pub subscription_error: Option<String>,
    /// True while a change feed is attached.
    pub subscribed: bool,
}

impl QueryState {
    pub fn is_settled(&self) -> bool {
        !self.loading
    }
}
