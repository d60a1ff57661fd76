use thiserror::Error;

/// Failure reported by a data source. Kept in view state, so it must be
/// cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl LoadError {
    pub fn request(message: impl Into<String>) -> Self {
        LoadError::Request(message.into())
    }
}

/// Setup-time mistakes; these are programmer errors, not runtime conditions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("view `{view}` has no data source")]
    MissingDataSource { view: String },
    #[error("no tokio runtime is running; build views from inside a runtime")]
    NoRuntime,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid serialized values: {0}")]
    Json(#[from] serde_json::Error),
    #[error("serialized values must be an object")]
    NotAnObject,
    #[error("no adapter registered for {kind} values")]
    Unregistered { kind: &'static str },
    #[error("cannot encode {tag} value: {reason}")]
    Encode { tag: String, reason: String },
    #[error("cannot decode {tag} value from {repr:?}")]
    Decode { tag: String, repr: String },
}
