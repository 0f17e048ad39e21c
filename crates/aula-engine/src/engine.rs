//! Conversation engine facade.
//!
//! The engine owns the configured adapters and workflow, turns one user
//! message into a [`ConversationResponse`], and keeps per-engine turn
//! statistics. A turn always yields a response: workflow errors and panics
//! are recovered into the generic apology.

use aula_ai::{ChatTurn, LanguageModel};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, ExecutionMode};
use crate::error::Result;
use crate::nodes::{Steps, Toolbox, panic_message};
use crate::replies::UNPROCESSED;
use crate::services::{ComplaintService, DocumentService};
use crate::state::{ConversationState, Intent};
use crate::tool::preview;
use crate::tools::{ComplaintTool, DocumentTool, LlmTool};
use crate::workflow::{Workflow, WorkflowInfo, build_workflow, recover};

const ENGINE_NAME: &str = "AulaConversationEngine";

/// Caller-supplied context for one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Empty for anonymous callers
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Kind of request a turn turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    DocumentQa,
    ComplaintSubmission,
    GeneralInfo,
}

impl From<Option<Intent>> for QueryType {
    fn from(intent: Option<Intent>) -> Self {
        match intent {
            Some(Intent::Question) => QueryType::DocumentQa,
            Some(Intent::Complaint) => QueryType::ComplaintSubmission,
            _ => QueryType::GeneralInfo,
        }
    }
}

/// What the caller gets back for one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub response_text: String,
    pub query_type: QueryType,
    pub sources: Vec<String>,
    pub confidence_score: f32,
    pub suggested_actions: Vec<String>,
    /// The executing tool's raw result, when there was one
    pub structured_data: Option<Map<String, Value>>,
    pub requires_followup: bool,
    pub metadata: Map<String, Value>,
}

impl ConversationResponse {
    fn from_state(state: ConversationState, mode: ExecutionMode) -> Self {
        let requires_followup = state.confidence < 0.5 || state.error_info.is_some();

        let mut metadata = Map::new();
        metadata.insert("engine".into(), Value::from(ENGINE_NAME));
        metadata.insert(
            "intent".into(),
            state.intent.map_or(Value::Null, |i| Value::from(i.as_str())),
        );
        metadata.insert(
            "tool_type".into(),
            state.tool_type.map_or(Value::Null, |t| Value::from(t.as_str())),
        );
        metadata.insert("tool_success".into(), Value::Bool(state.tool_success));
        metadata.insert(
            "processing_step".into(),
            Value::from(state.processing_step.as_str()),
        );
        metadata.insert("execution_mode".into(), Value::from(mode.as_str()));
        if let Some(error) = &state.error_info {
            metadata.insert("error_type".into(), Value::from(error.error_type.clone()));
        }
        metadata.extend(state.metadata);

        Self {
            response_text: state
                .response
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| UNPROCESSED.to_string()),
            query_type: state.intent.into(),
            sources: state.sources,
            confidence_score: state.confidence,
            suggested_actions: state.suggested_actions,
            structured_data: state.tool_result.filter(|r| !r.is_empty()),
            requires_followup,
            metadata,
        }
    }
}

/// Overall health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Turn counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineStats {
    pub turns: u64,
    pub failed_turns: u64,
    pub average_processing_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub engine: &'static str,
    /// Adapter name to liveness
    pub tools: BTreeMap<String, bool>,
    pub stats: EngineStats,
    pub workflow: WorkflowInfo,
}

#[derive(Default)]
struct Counters {
    turns: AtomicU64,
    failed_turns: AtomicU64,
    total_processing_us: AtomicU64,
}

/// Classify, route, execute and format user turns
pub struct ConversationEngine {
    config: EngineConfig,
    tools: Toolbox,
    workflow: Arc<dyn Workflow>,
    counters: Counters,
}

impl ConversationEngine {
    /// Build an engine over the given adapters
    pub fn new(tools: Toolbox, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let steps = Arc::new(Steps::new(&tools, &config));
        let workflow = build_workflow(steps, config.execution_mode)?;

        tracing::info!(
            tools = ?tools.all().iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            execution_mode = workflow.mode().as_str(),
            "Conversation engine initialized"
        );

        Ok(Self {
            config,
            tools,
            workflow,
            counters: Counters::default(),
        })
    }

    /// Build an engine with all three collaborators
    pub fn from_services(
        documents: Arc<dyn DocumentService>,
        complaints: Arc<dyn ComplaintService>,
        model: Arc<dyn LanguageModel>,
        config: EngineConfig,
    ) -> Result<Self> {
        let tools = Toolbox::default()
            .with_document(DocumentTool::new(documents))
            .with_complaint(ComplaintTool::new(complaints))
            .with_llm(LlmTool::new(model, &config));
        Self::new(tools, config)
    }

    /// Replace the workflow that drives each turn
    pub fn with_workflow(mut self, workflow: Arc<dyn Workflow>) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &Toolbox {
        &self.tools
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.workflow.mode()
    }

    pub fn workflow_info(&self) -> WorkflowInfo {
        self.workflow.info()
    }

    /// Process one user message
    pub async fn process(
        &self,
        user_message: &str,
        context: &ConversationContext,
    ) -> ConversationResponse {
        self.process_with_cancel(user_message, context, &CancellationToken::new())
            .await
    }

    /// Process one user message, aborting in-flight adapter calls when
    /// `cancel` fires. A cancelled call degrades like any adapter failure.
    pub async fn process_with_cancel(
        &self,
        user_message: &str,
        context: &ConversationContext,
        cancel: &CancellationToken,
    ) -> ConversationResponse {
        let start = Instant::now();
        tracing::info!(
            user_id = %context.user_id,
            session_id = context.session_id.as_deref().unwrap_or(""),
            message_preview = %preview(user_message, 50),
            "Processing conversation turn"
        );

        let mut state = ConversationState::initialize(
            user_message,
            context.user_id.clone(),
            context.session_id.clone(),
            context.history.clone(),
            self.config.history_window,
        );

        let outcome = AssertUnwindSafe(self.workflow.run(&mut state, cancel))
            .catch_unwind()
            .await;
        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                recover(&mut state, &e.to_string());
                true
            }
            Err(payload) => {
                recover(&mut state, &format!("panic: {}", panic_message(payload)));
                true
            }
        };

        let elapsed = start.elapsed();
        self.record_turn(elapsed.as_micros() as u64, failed);

        let summary = state.summary();
        tracing::info!(
            user_id = %summary.user_id,
            intent = summary.intent.map(|i| i.as_str()).unwrap_or("none"),
            tool_success = summary.tool_success,
            confidence = summary.confidence,
            has_error = summary.has_error,
            execution_ms = elapsed.as_millis() as u64,
            "Conversation turn processed"
        );

        ConversationResponse::from_state(state, self.workflow.mode())
    }

    fn record_turn(&self, processing_us: u64, failed: bool) {
        let turns = self.counters.turns.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters
            .total_processing_us
            .fetch_add(processing_us, Ordering::Relaxed);
        if failed {
            self.counters.failed_turns.fetch_add(1, Ordering::Relaxed);
        }
        if turns % 100 == 0 {
            let stats = self.stats();
            tracing::info!(
                turns = stats.turns,
                failed_turns = stats.failed_turns,
                average_processing_ms = stats.average_processing_ms,
                "Engine statistics"
            );
        }
    }

    pub fn stats(&self) -> EngineStats {
        let turns = self.counters.turns.load(Ordering::Relaxed);
        let total_us = self.counters.total_processing_us.load(Ordering::Relaxed);
        EngineStats {
            turns,
            failed_turns: self.counters.failed_turns.load(Ordering::Relaxed),
            average_processing_ms: if turns == 0 {
                0.0
            } else {
                total_us as f64 / turns as f64 / 1000.0
            },
        }
    }

    /// Probe every adapter. Degraded when any probe fails.
    pub async fn health_check(&self) -> HealthReport {
        let probes = self.tools.all().into_iter().map(|tool| async move {
            let healthy = tool.health_check().await;
            (tool.name().to_string(), healthy)
        });
        let tools: BTreeMap<String, bool> = futures::future::join_all(probes)
            .await
            .into_iter()
            .collect();

        let status = if tools.values().all(|healthy| *healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        tracing::info!(status = ?status, tools = ?tools, "Engine health check completed");

        HealthReport {
            status,
            engine: ENGINE_NAME,
            tools,
            stats: self.stats(),
            workflow: self.workflow_info(),
        }
    }
}
