//! Tool trait, normalized tool results and shared instrumentation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, ToolExecutionError};

/// Capability family of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Document,
    Complaint,
    Llm,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Document => "document",
            ToolType::Complaint => "complaint",
            ToolType::Llm => "llm",
        }
    }
}

/// Normalized output of any adapter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_type: ToolType,
    pub success: bool,
    /// Tool-specific payload
    pub data: Map<String, Value>,
    pub sources: Vec<String>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub error_details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_ms: Option<u64>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(tool_type: ToolType, data: Map<String, Value>, confidence: f32) -> Self {
        Self {
            tool_type,
            success: true,
            data,
            sources: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            error_type: None,
            error_message: None,
            error_details: Map::new(),
            execution_ms: None,
        }
    }

    /// Create an error result
    pub fn error(tool_type: ToolType, error: &ToolExecutionError) -> Self {
        let mut details = error.details.clone();
        details.insert("recoverable".into(), Value::Bool(error.recoverable));
        Self {
            tool_type,
            success: false,
            data: Map::new(),
            sources: Vec::new(),
            confidence: 0.0,
            error_type: Some(error.kind),
            error_message: Some(error.message.clone()),
            error_details: details,
            execution_ms: None,
        }
    }

    /// Attach sources to the result
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Mark a data-bearing result as unsuccessful without an error
    /// (e.g. a search that matched nothing)
    pub fn unsuccessful(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn is_recoverable(&self) -> bool {
        self.error_details
            .get("recoverable")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

/// Common surface of every adapter
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in logs and health output)
    fn name(&self) -> &str;

    fn tool_type(&self) -> ToolType;

    /// Report liveness of the wrapped collaborator without mutating state
    async fn health_check(&self) -> bool;

    /// Operations and limits, for diagnostics
    fn capabilities(&self) -> Value;
}

/// Outcome fields reported when an adapter operation completes
pub(crate) trait Timed {
    fn success(&self) -> bool;
    fn confidence(&self) -> f32;
    fn set_execution_ms(&mut self, ms: u64);
}

impl Timed for ToolResult {
    fn success(&self) -> bool {
        self.success
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn set_execution_ms(&mut self, ms: u64) {
        self.execution_ms = Some(ms);
    }
}

/// Time one adapter operation and log its start and outcome. Returns the
/// elapsed milliseconds alongside the outcome.
pub(crate) async fn timed<F, T>(
    tool_name: &str,
    operation: &str,
    params: Value,
    fut: F,
) -> (Result<T, ToolExecutionError>, u64)
where
    F: Future<Output = Result<T, ToolExecutionError>>,
    T: Timed,
{
    let start = Instant::now();
    tracing::info!(tool = tool_name, operation, parameters = %params, "Tool execution started");

    let outcome = fut.await;
    let execution_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(mut value) => {
            value.set_execution_ms(execution_ms);
            tracing::info!(
                tool = tool_name,
                operation,
                execution_ms,
                success = value.success(),
                confidence = value.confidence(),
                "Tool execution completed"
            );
            (Ok(value), execution_ms)
        }
        Err(error) => {
            tracing::error!(
                tool = tool_name,
                operation,
                error_type = %error.kind,
                error_message = %error.message,
                execution_ms,
                recoverable = error.recoverable,
                "Tool execution failed"
            );
            (Err(error), execution_ms)
        }
    }
}

/// Run one adapter operation with timing, structured logging and error
/// normalization. Errors never escape: they become `success=false` results.
pub(crate) async fn instrumented<F>(
    tool_name: &str,
    tool_type: ToolType,
    operation: &str,
    params: Value,
    fut: F,
) -> ToolResult
where
    F: Future<Output = Result<ToolResult, ToolExecutionError>>,
{
    match timed(tool_name, operation, params, fut).await {
        (Ok(result), _) => result,
        (Err(error), execution_ms) => {
            let mut result = ToolResult::error(tool_type, &error);
            result.execution_ms = Some(execution_ms);
            result
        }
    }
}

/// Await `fut` unless `cancel` fires first
pub(crate) async fn cancellable<F, T>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, ToolExecutionError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(
            ToolExecutionError::new(ErrorKind::ServiceError, "Operation cancelled")
                .with_detail("exception_type", "Cancelled"),
        ),
        value = fut => Ok(value),
    }
}

/// Truncate string parameters for logging
pub(crate) fn sanitize(text: &str) -> String {
    if text.chars().count() > 100 {
        let head: String = text.chars().take(100).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// First `n` characters of `text`
pub(crate) fn preview(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
