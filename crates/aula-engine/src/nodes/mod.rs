//! Pipeline steps and the routing table between them

mod classification;
mod complaint;
mod document_search;
mod formatting;
mod general_chat;

pub use classification::ClassificationNode;
pub use complaint::ComplaintNode;
pub use document_search::{DocumentSearchNode, NO_INFO_SENTINEL, is_no_info};
pub use formatting::FormattingNode;
pub(crate) use formatting::panic_message;
pub use general_chat::GeneralChatNode;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::state::{ConversationState, Intent};
use crate::tool::{Tool, preview};
use crate::tools::{ComplaintTool, DocumentTool, LlmTool};

/// One step of the pipeline. Steps never fail outward: problems are
/// recorded on the state and the pipeline moves on.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken);
}

/// Run a node with start/complete logging
pub(crate) async fn run_logged(
    node: &dyn Node,
    state: &mut ConversationState,
    cancel: &CancellationToken,
) {
    let start = Instant::now();
    tracing::info!(
        node = node.name(),
        user_id = %state.user_id,
        processing_step = state.processing_step.as_str(),
        message_preview = %preview(&state.user_message, 30),
        "Node started"
    );

    node.run(state, cancel).await;

    tracing::info!(
        node = node.name(),
        user_id = %state.user_id,
        processing_step = state.processing_step.as_str(),
        has_error = state.error_info.is_some(),
        execution_ms = start.elapsed().as_millis() as u64,
        "Node completed"
    );
}

/// The adapters available to the pipeline. Any of them may be absent;
/// steps degrade to their fallbacks when theirs is missing.
#[derive(Clone, Default)]
pub struct Toolbox {
    pub document: Option<Arc<DocumentTool>>,
    pub complaint: Option<Arc<ComplaintTool>>,
    pub llm: Option<Arc<LlmTool>>,
}

impl Toolbox {
    pub fn with_document(mut self, tool: DocumentTool) -> Self {
        self.document = Some(Arc::new(tool));
        self
    }

    pub fn with_complaint(mut self, tool: ComplaintTool) -> Self {
        self.complaint = Some(Arc::new(tool));
        self
    }

    pub fn with_llm(mut self, tool: LlmTool) -> Self {
        self.llm = Some(Arc::new(tool));
        self
    }

    /// Every configured adapter, for health and diagnostics
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        if let Some(tool) = &self.document {
            tools.push(tool.clone());
        }
        if let Some(tool) = &self.complaint {
            tools.push(tool.clone());
        }
        if let Some(tool) = &self.llm {
            tools.push(tool.clone());
        }
        tools
    }
}

/// Execution step chosen for a classified intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    DocumentSearch,
    ComplaintProcessing,
    GeneralChat,
}

impl Handler {
    pub const ALL: [Handler; 3] = [
        Handler::DocumentSearch,
        Handler::ComplaintProcessing,
        Handler::GeneralChat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Handler::DocumentSearch => "document_search",
            Handler::ComplaintProcessing => "complaint_processing",
            Handler::GeneralChat => "general_chat",
        }
    }
}

/// Fixed routing table. Unknown intents go to general chat.
pub fn route(intent: Intent) -> Handler {
    match intent {
        Intent::Question => Handler::DocumentSearch,
        Intent::Complaint => Handler::ComplaintProcessing,
        Intent::General | Intent::Unknown => Handler::GeneralChat,
    }
}

/// Route the state's intent, recording the choice
pub(crate) fn route_state(state: &mut ConversationState) -> Handler {
    let intent = state.intent.unwrap_or(Intent::Unknown);
    let handler = route(intent);
    state.mark_routed();
    tracing::info!(
        intent = intent.as_str(),
        handler = handler.name(),
        user_id = %state.user_id,
        "Routing decision"
    );
    handler
}

/// Every step of the pipeline, built once per engine
pub struct Steps {
    pub classification: Arc<ClassificationNode>,
    pub document_search: Arc<DocumentSearchNode>,
    pub complaint: Arc<ComplaintNode>,
    pub general_chat: Arc<GeneralChatNode>,
    pub formatting: Arc<FormattingNode>,
}

impl Steps {
    pub fn new(tools: &Toolbox, config: &EngineConfig) -> Self {
        Self {
            classification: Arc::new(ClassificationNode::new(tools.llm.clone())),
            document_search: Arc::new(DocumentSearchNode::new(
                tools.document.clone(),
                tools.llm.clone(),
                config,
            )),
            complaint: Arc::new(ComplaintNode::new(tools.complaint.clone())),
            general_chat: Arc::new(GeneralChatNode::new(
                tools.llm.clone(),
                &config.institution,
            )),
            formatting: Arc::new(FormattingNode::new()),
        }
    }

    /// The execution step for a routing decision
    pub fn handler(&self, handler: Handler) -> Arc<dyn Node> {
        match handler {
            Handler::DocumentSearch => self.document_search.clone(),
            Handler::ComplaintProcessing => self.complaint.clone(),
            Handler::GeneralChat => self.general_chat.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_is_total_and_deterministic() {
        for intent in Intent::ALL {
            let first = route(intent);
            assert!(Handler::ALL.contains(&first));
            for _ in 0..3 {
                assert_eq!(route(intent), first);
            }
        }
    }

    #[test]
    fn test_route_table() {
        assert_eq!(route(Intent::Question).name(), "document_search");
        assert_eq!(route(Intent::Complaint).name(), "complaint_processing");
        assert_eq!(route(Intent::General).name(), "general_chat");
        assert_eq!(route(Intent::Unknown).name(), "general_chat");
    }

    #[test]
    fn test_route_state_marks_routed() {
        let mut state = ConversationState::initialize("hola", "u", None, vec![], 3);
        state.update_intent(Intent::Complaint, 0.9);
        assert_eq!(route_state(&mut state), Handler::ComplaintProcessing);
        assert_eq!(
            state.processing_step,
            crate::state::ProcessingStep::Routed
        );
    }

    #[test]
    fn test_empty_toolbox() {
        assert!(Toolbox::default().all().is_empty());
    }
}
