//! Error types for aula-engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type alias using aula-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building an engine. A running pipeline never returns
/// these: turn-level failures are recorded on the conversation state instead.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] aula_ai::Error),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The workflow could not be assembled or run
    #[error("Workflow error: {0}")]
    Workflow(String),
}

/// Classification of tool failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty or malformed arguments; never retried
    InvalidInput,
    /// Collaborator or network failure
    ServiceError,
    /// The model produced no usable text
    EmptyResponse,
    /// Anything else
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ServiceError => "service_error",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure of a single tool operation
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ToolExecutionError {
    pub message: String,
    pub kind: ErrorKind,
    pub details: Map<String, Value>,
    pub recoverable: bool,
}

impl ToolExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            details: Map::new(),
            recoverable: true,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Wrap a collaborator failure, keeping the error type for diagnostics
    pub fn from_service(context: &str, err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(ErrorKind::ServiceError, format!("{}: {}", context, err))
            .with_detail("exception_type", error_type_name(err))
    }

    /// Wrap a provider failure
    pub fn from_ai(context: &str, err: &aula_ai::Error) -> Self {
        let kind = match err {
            aula_ai::Error::EmptyResponse => ErrorKind::EmptyResponse,
            _ => ErrorKind::ServiceError,
        };
        Self::new(kind, format!("{}: {}", context, err))
            .with_detail("exception_type", err.kind_name())
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn unrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

/// Best-effort type name of a boxed error. Falls back to the last path
/// segment of its `Debug` form (e.g. `Os { .. }` -> `Os`).
fn error_type_name(err: &(dyn std::error::Error + 'static)) -> String {
    if err.is::<std::io::Error>() {
        return "io::Error".to_string();
    }
    let debug = format!("{:?}", err);
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_value(ErrorKind::InvalidInput).unwrap();
        assert_eq!(json, "invalid_input");
        assert_eq!(ErrorKind::ServiceError.to_string(), "service_error");
    }

    #[test]
    fn test_tool_error_defaults_recoverable() {
        let e = ToolExecutionError::invalid_input("empty query");
        assert!(e.recoverable);
        assert_eq!(e.kind, ErrorKind::InvalidInput);
        assert_eq!(e.to_string(), "empty query");
    }

    #[test]
    fn test_from_service_records_type() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e = ToolExecutionError::from_service("Document search failed", &io);
        assert_eq!(e.kind, ErrorKind::ServiceError);
        assert_eq!(e.details["exception_type"], "io::Error");
        assert!(e.message.starts_with("Document search failed: "));
    }

    #[test]
    fn test_from_ai_empty_response() {
        let e = ToolExecutionError::from_ai("generation failed", &aula_ai::Error::EmptyResponse);
        assert_eq!(e.kind, ErrorKind::EmptyResponse);
        assert_eq!(e.details["exception_type"], "EmptyResponse");
    }
}
