//! Error types for log store operations.

use thiserror::Error;

/// Errors that can occur during log store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be opened: bad path, not a log database, or an
    /// unsupported schema version.
    #[error("Cannot open log store {path}: {reason}")]
    CannotOpen {
        /// Path that was requested.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A record could not be persisted.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A topic was recorded before with a different message type.
    #[error("Topic {topic} is recorded as {recorded}, not {requested}")]
    TypeMismatch {
        /// Topic name.
        topic: String,
        /// Type stored in the catalog.
        recorded: String,
        /// Type of the rejected message.
        requested: String,
    },

    /// Native DB error on the read path.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid topic name.
    #[error(transparent)]
    Topic(#[from] tracklog_core::Error),
}

/// Result type for log store operations.
pub type Result<T> = std::result::Result<T, Error>;
