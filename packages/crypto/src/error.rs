use scriptbridge_core::OperationError;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    /// The argument does not have the shape of an algorithm or key.
    #[error("malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },

    #[error("unsupported {what}: {name}")]
    Unsupported { what: &'static str, name: String },

    #[error("unknown key id: {kid}")]
    UnknownKey { kid: String },

    #[error("key {kid} is a {actual} key, expected a {expected} key")]
    WrongKeyKind {
        kid: String,
        actual: String,
        expected: String,
    },

    #[error("invalid key data: {message}")]
    InvalidKey { message: String },

    #[error("key {kid} is not extractable")]
    NotExtractable { kid: String },

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CryptoError {
    pub fn malformed(what: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            message: message.into(),
        }
    }

    pub fn unsupported(what: &'static str, name: impl Into<String>) -> Self {
        Self::Unsupported {
            what,
            name: name.into(),
        }
    }

    pub fn invalid_key(message: impl ToString) -> Self {
        Self::InvalidKey {
            message: message.to_string(),
        }
    }
}

impl From<CryptoError> for OperationError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::Malformed { .. } => OperationError::argument(error.to_string()),
            CryptoError::Json(_) => OperationError::serialization(error.to_string()),
            _ => OperationError::key(error.to_string()),
        }
    }
}
