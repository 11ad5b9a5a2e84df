//! Error types for the ingestion engine

use thiserror::Error;

/// Classified failure of a single page fetch
///
/// Every variant is terminal for the run that hit it; the fetcher never
/// retries on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network or connection failure (includes timeouts)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The endpoint answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The body is not the expected listing document
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl FetchError {
    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an HttpStatus error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Creates a Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Stable label used for the `error_type` metric label
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Decode { .. } => "json_decode",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::http_status(status.as_u16(), err.to_string())
        } else {
            FetchError::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::decode(err.to_string())
    }
}

/// Errors that keep a run from producing an outcome
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Malformed target id or page bounds
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A spawned run did not complete (panicked or aborted)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Creates an InvalidInput error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable label used for the `error_type` metric label
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InvalidInput(_) => "input_validation",
            IngestError::Internal(_) => "internal",
        }
    }
}
