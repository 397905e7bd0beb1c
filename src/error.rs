use std::path::PathBuf;

use thiserror::Error;

use crate::model::Origin;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type covering the failures a partition backend, the fixture loader,
/// or the command line can report.
///
/// Aggregation and live views never return these to their callers: a failing
/// partition is logged and treated as contributing no records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as reading fixture files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised by a backend when a single query cannot be served.
    #[error("query on {origin} table '{table}' failed: {reason}")]
    Query {
        origin: Origin,
        table: String,
        reason: String,
    },

    /// Raised by a backend when a change listener cannot be registered.
    #[error("subscription to channel '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    /// Raised when a connector does not understand the endpoint it was given.
    #[error("unsupported endpoint '{0}'")]
    UnsupportedEndpoint(String),

    /// Raised when a fixture file does not follow the `{table: [rows]}` layout.
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
