//! Error types for the control-plane core.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to the caller of a single operation.
///
/// A pattern that is absent from tool output is never an error; it shows
/// up as `None` or `false` on the affected field instead.
#[derive(Error, Debug)]
pub enum BluedeckError {
    /// The external executable is missing or could not be spawned.
    #[error("failed to invoke {program}: {source}")]
    Invocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Input rejected before any external call was issued.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No background job was ever registered under this id.
    #[error("unknown job: {0}")]
    UnknownJob(Uuid),

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed protocol message.
    #[error("protocol error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type for core operations.
pub type Result<T> = std::result::Result<T, BluedeckError>;
