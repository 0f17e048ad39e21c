//! Error types for aula-ai

use thiserror::Error;

/// Result type alias using aula-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when prompting a language model
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// The model answered with no text at all
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the variant, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Http(_) => "Http",
            Error::Json(_) => "Json",
            Error::Api { .. } => "Api",
            Error::RateLimited { .. } => "RateLimited",
            Error::InvalidApiKey => "InvalidApiKey",
            Error::EmptyResponse => "EmptyResponse",
            Error::UnexpectedResponse(_) => "UnexpectedResponse",
            Error::InvalidConfig(_) => "InvalidConfig",
        }
    }
}
