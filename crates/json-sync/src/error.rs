use thiserror::Error;

/// Errors surfaced at the public boundary of the sync engine.
///
/// Internal invariant violations are not represented here; they panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("invalid key {key:?}: keys must be non-empty strings without '.', '#', '$', '/', '[', ']' or control characters")]
    InvalidKey { key: String },
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    #[error("invalid data at {path}: {reason}")]
    InvalidData { path: String, reason: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("cannot write to read-only path {0}")]
    ReadOnlyPath(String),
    #[error("no pending write with id {0}")]
    UnknownWrite(u64),
    #[error("listen at {path} failed: {status}")]
    ListenFailed { path: String, status: String },
    #[error("config error: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::InvalidPath { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn invalid_data(path: impl ToString, reason: impl Into<String>) -> Self {
        SyncError::InvalidData { path: path.to_string(), reason: reason.into() }
    }
}
