//! Workflow implementations that drive a turn through the pipeline

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Map;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutionMode;
use crate::error::Result;
use crate::nodes::{Steps, route_state, run_logged};
use crate::replies::{APOLOGY, actions};
use crate::state::{ConversationState, Intent, ProcessingStep};

/// Confidence of the apology substituted after a workflow failure
pub const RECOVERY_CONFIDENCE: f32 = 0.1;

/// Static description of a workflow, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowInfo {
    pub workflow_name: &'static str,
    pub execution_mode: ExecutionMode,
    pub graph_available: bool,
    pub nodes: Vec<&'static str>,
    pub flow: Vec<&'static str>,
    pub supported_intents: Vec<&'static str>,
}

impl WorkflowInfo {
    pub(crate) fn new(execution_mode: ExecutionMode) -> Self {
        Self {
            workflow_name: "chat_workflow",
            execution_mode,
            graph_available: cfg!(feature = "graph"),
            nodes: vec![
                "classify",
                "document_search",
                "complaint_processing",
                "general_chat",
                "format_response",
            ],
            flow: vec![
                "classify (intent classification)",
                "route (by intent)",
                "execute (document_search | complaint_processing | general_chat)",
                "format_response (final response)",
            ],
            supported_intents: Intent::ALL.iter().map(Intent::as_str).collect(),
        }
    }
}

/// Runs classify -> route -> execute -> format over one state
#[async_trait]
pub trait Workflow: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Drive the state to its terminal step. An error means the workflow
    /// itself broke; the caller recovers the state with [`recover`].
    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) -> Result<()>;

    fn info(&self) -> WorkflowInfo {
        WorkflowInfo::new(self.mode())
    }
}

/// Plain step-by-step execution
pub struct SequentialWorkflow {
    steps: Arc<Steps>,
}

impl SequentialWorkflow {
    pub fn new(steps: Arc<Steps>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Workflow for SequentialWorkflow {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(user_id = %state.user_id, "Executing sequential workflow");

        run_logged(self.steps.classification.as_ref(), state, cancel).await;
        let handler = route_state(state);
        run_logged(self.steps.handler(handler).as_ref(), state, cancel).await;
        run_logged(self.steps.formatting.as_ref(), state, cancel).await;

        tracing::info!(
            user_id = %state.user_id,
            intent = state.intent.map(|i| i.as_str()).unwrap_or("none"),
            success = state.response.is_some(),
            "Sequential workflow completed"
        );
        Ok(())
    }
}

/// Build the workflow for `mode`. Without the `graph` feature every mode
/// runs sequentially.
pub fn build_workflow(steps: Arc<Steps>, mode: ExecutionMode) -> Result<Arc<dyn Workflow>> {
    match mode {
        ExecutionMode::Sequential => Ok(Arc::new(SequentialWorkflow::new(steps))),
        #[cfg(feature = "graph")]
        ExecutionMode::Graph => Ok(Arc::new(crate::graph::GraphWorkflow::new(steps)?)),
        #[cfg(not(feature = "graph"))]
        ExecutionMode::Graph => {
            tracing::info!("Graph runtime not compiled in, using sequential workflow");
            Ok(Arc::new(SequentialWorkflow::new(steps)))
        }
    }
}

/// Move a state whose workflow failed into the terminal step with the
/// generic apology
pub fn recover(state: &mut ConversationState, reason: &str) {
    tracing::error!(user_id = %state.user_id, error = reason, "Workflow failed");
    state.processing_step = ProcessingStep::Failed;
    state.add_error("workflow_error", reason, Map::new());
    state.update_response(
        APOLOGY,
        RECOVERY_CONFIDENCE,
        vec![
            actions::REPHRASE.to_string(),
            actions::CONTACT_SUPPORT.to_string(),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::nodes::Toolbox;
    use crate::services::ComplaintCategory;
    use crate::testing::{FakeComplaints, FakeDocuments, ScriptedModel, chunk};
    use crate::tool::ToolType;
    use crate::tools::{ComplaintTool, DocumentTool, LlmTool};

    fn steps(model: ScriptedModel, docs: FakeDocuments, complaints: Arc<FakeComplaints>) -> Arc<Steps> {
        let config = EngineConfig::default();
        let tools = Toolbox::default()
            .with_llm(LlmTool::new(Arc::new(model), &config))
            .with_document(DocumentTool::new(Arc::new(docs)))
            .with_complaint(ComplaintTool::new(complaints));
        Arc::new(Steps::new(&tools, &config))
    }

    fn state(msg: &str) -> ConversationState {
        ConversationState::initialize(msg, "", None, vec![], 3)
    }

    #[tokio::test]
    async fn test_sequential_complaint_turn() {
        let complaints = Arc::new(FakeComplaints::new());
        let workflow = SequentialWorkflow::new(steps(
            ScriptedModel::replying(r#"{"intent": "queja", "confidence": 0.9}"#),
            FakeDocuments::with_chunks(vec![]),
            complaints.clone(),
        ));
        let mut s = state("el wifi no funciona en la biblioteca");
        workflow.run(&mut s, &CancellationToken::new()).await.unwrap();

        assert_eq!(s.intent, Some(Intent::Complaint));
        assert_eq!(s.tool_type, Some(ToolType::Complaint));
        assert_eq!(s.processing_step, ProcessingStep::Formatted);
        assert!(s.response.as_deref().unwrap().contains("ID del reporte"));
        assert_eq!(complaints.submissions()[0].category, ComplaintCategory::Technology);
    }

    #[tokio::test]
    async fn test_sequential_question_turn() {
        let workflow = SequentialWorkflow::new(steps(
            ScriptedModel::sequence(&[
                r#"{"intent": "pregunta", "confidence": 0.9}"#,
                "Los exámenes finales son del 1 al 15 de julio.",
            ]),
            FakeDocuments::with_chunks(vec![chunk("Exámenes: 1 al 15 de julio", 0.85, "calendario.pdf")]),
            Arc::new(FakeComplaints::new()),
        ));
        let mut s = state("¿Cuándo son los exámenes finales?");
        workflow.run(&mut s, &CancellationToken::new()).await.unwrap();

        assert!(s.tool_success);
        assert!((s.confidence - 0.9).abs() < 1e-6);
        assert!(s.response.as_deref().unwrap().contains("📄 Fuente: calendario.pdf"));
    }

    #[test]
    fn test_recover_sets_apology() {
        let mut s = state("hola");
        recover(&mut s, "boom");
        assert_eq!(s.response.as_deref(), Some(APOLOGY));
        assert_eq!(s.confidence, RECOVERY_CONFIDENCE);
        assert_eq!(s.processing_step, ProcessingStep::Formatted);
        let info = s.error_info.unwrap();
        assert_eq!(info.error_type, "workflow_error");
        assert_eq!(info.step, ProcessingStep::Failed);
    }

    #[test]
    fn test_build_sequential() {
        let workflow = build_workflow(
            steps(
                ScriptedModel::replying("x"),
                FakeDocuments::with_chunks(vec![]),
                Arc::new(FakeComplaints::new()),
            ),
            ExecutionMode::Sequential,
        )
        .unwrap();
        assert_eq!(workflow.mode(), ExecutionMode::Sequential);
        assert_eq!(workflow.info().nodes.len(), 5);
    }
}
