/// Why a query or change feed failed. The live query reads it to choose
/// between reporting the failure, skipping one change and re-attaching the
/// feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials, URL or query; retrying the same request fails again.
    Config,
    /// Backend unreachable, timed out or overloaded; a dropped feed is
    /// re-attached.
    Io,
    /// A row or change frame that does not decode; that one change is dropped
    /// and the feed stays open.
    Format,
    /// The backend answered but refused: unknown collection, rejected channel
    /// join, duplicate id.
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Failure of a `DataService` query or a `ChangeSubscription`.
///
/// The message is what ends up in `QueryState::error` or
/// `subscription_error`, so it should read well on its own. I/O errors map
/// to `Io`, JSON errors to `Format`, plain strings to `Logic`.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    /// Backend refusal (`Logic`).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Outages are worth a reconnect attempt.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Io
    }
}

impl std::fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<String> for ServiceError {
    fn from(s: String) -> Self { Self { kind: ErrorKind::Logic, message: s } }
}

impl From<&str> for ServiceError {
    fn from(s: &str) -> Self { Self { kind: ErrorKind::Logic, message: s.to_string() } }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_conversions() {
        let io: ServiceError = std::io::Error::other("connection refused").into();
        assert_eq!(io.kind(), ErrorKind::Io);
        assert!(io.is_transient());

        let bad: ServiceError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(bad.kind(), ErrorKind::Format);
        assert!(!bad.is_transient());
    }

    #[test]
    fn test_display_is_message_only() {
        let err = ServiceError::config("collection must not be empty");
        assert_eq!(err.to_string(), "collection must not be empty");
        assert_eq!(format!("{err:?}"), "[config] collection must not be empty");
    }
}
