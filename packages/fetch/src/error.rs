use scriptbridge_core::OperationError;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid HTTP method: {method}")]
    InvalidMethod { method: String },

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("Redirect refused: {url} answered with status {status}")]
    RedirectRefused { url: String, status: u16 },

    #[error("Body read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local handler failed: {message}")]
    Handler { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

impl From<FetchError> for OperationError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::UrlParse(_)
            | FetchError::InvalidMethod { .. }
            | FetchError::InvalidHeaderName(_)
            | FetchError::InvalidHeaderValue(_) => OperationError::argument(error.to_string()),
            FetchError::Json(_) => OperationError::serialization(error.to_string()),
            _ => OperationError::transport(error.to_string()),
        }
    }
}
