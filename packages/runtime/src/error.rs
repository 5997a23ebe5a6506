//! Error types for the script runtime.

use std::time::Duration;

use thiserror::Error;

/// Errors returned to the host driver.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Evaluating the script threw.
    #[error("script error: {message}")]
    Script { message: String },

    /// The script's final promise rejected.
    #[error("script rejected with {value}")]
    Rejected { value: serde_json::Value },

    /// The final promise did not settle before the deadline.
    #[error("script did not settle within {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// A host channel closed while a run was in progress.
    #[error("host channel disconnected")]
    Disconnected,

    /// The interpreter itself failed.
    #[error("interpreter error: {0}")]
    Interpreter(#[from] rquickjs::Error),

    /// Building the fetch transport failed.
    #[error("fetch setup failed: {0}")]
    Fetch(#[from] scriptbridge_fetch::FetchError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// `name` of a rejection value, when it was an error object.
    pub fn rejection_name(&self) -> Option<&str> {
        match self {
            RuntimeError::Rejected { value } => value.get("name").and_then(|n| n.as_str()),
            _ => None,
        }
    }
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
