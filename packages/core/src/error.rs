//! Failure taxonomy shared by every async operation.

/// Why an async operation settled as a failure.
///
/// Argument errors are raised synchronously by the host function and never
/// reach a worker; every other variant arrives as a promise rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// Wrong arity or type at call time.
    #[error("invalid argument: {message}")]
    Argument { message: String },

    /// Network, DNS or TLS failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Unknown or invalid key id, unsupported algorithm, or malformed key.
    #[error("key error: {message}")]
    Key { message: String },

    /// A result could not be represented in the interpreter's value model.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// The run that owned the operation was abandoned before it settled.
    #[error("operation {operation} was cancelled")]
    Cancelled { operation: String },

    /// The worker exited without settling its operation.
    #[error("operation {operation} ended without settling")]
    Abandoned { operation: String },
}

impl OperationError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::Key {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Error class name surfaced to script as `error.name`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Argument { .. } => "TypeError",
            Self::Transport { .. } => "TransportError",
            Self::Key { .. } => "KeyError",
            Self::Serialization { .. } => "SerializationError",
            Self::Cancelled { .. } => "AbortError",
            Self::Abandoned { .. } => "InternalError",
        }
    }

    /// Human readable message without the class prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Argument { message }
            | Self::Transport { message }
            | Self::Key { message }
            | Self::Serialization { message } => message.clone(),
            Self::Cancelled { .. } | Self::Abandoned { .. } => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}
