//! Directed-graph workflow runtime.
//!
//! Nodes are registered by name and wired with plain or conditional edges.
//! A compiled graph runs from its entry point until the finish point has
//! executed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutionMode;
use crate::error::{Error, Result};
use crate::nodes::{Handler, Node, Steps, route_state, run_logged};
use crate::state::ConversationState;
use crate::workflow::Workflow;

/// Upper bound on node executions per run, guarding against cycles
const MAX_STEPS: usize = 25;

/// Picks the branch label to follow after a node
pub type Router = Box<dyn Fn(&mut ConversationState) -> &'static str + Send + Sync>;

enum Edge {
    Direct(&'static str),
    Conditional {
        router: Router,
        branches: HashMap<&'static str, &'static str>,
    },
}

/// Graph under construction
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<&'static str, Arc<dyn Node>>,
    edges: HashMap<&'static str, Edge>,
    entry: Option<&'static str>,
    finish: Option<&'static str>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &'static str, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(name, node);
        self
    }

    pub fn add_edge(&mut self, from: &'static str, to: &'static str) -> &mut Self {
        self.edges.insert(from, Edge::Direct(to));
        self
    }

    /// After `from`, call `router` and follow the branch it names
    pub fn add_conditional_edges(
        &mut self,
        from: &'static str,
        router: Router,
        branches: &[(&'static str, &'static str)],
    ) -> &mut Self {
        self.edges.insert(
            from,
            Edge::Conditional {
                router,
                branches: branches.iter().copied().collect(),
            },
        );
        self
    }

    pub fn set_entry_point(&mut self, name: &'static str) -> &mut Self {
        self.entry = Some(name);
        self
    }

    pub fn set_finish_point(&mut self, name: &'static str) -> &mut Self {
        self.finish = Some(name);
        self
    }

    /// Check the wiring: every edge endpoint is a node and every node but
    /// the finish point has an outgoing edge
    pub fn compile(self) -> Result<CompiledGraph> {
        let entry = self
            .entry
            .ok_or_else(|| Error::Workflow("graph has no entry point".into()))?;
        let finish = self
            .finish
            .ok_or_else(|| Error::Workflow("graph has no finish point".into()))?;

        for name in [entry, finish] {
            if !self.nodes.contains_key(name) {
                return Err(Error::Workflow(format!("unknown node '{}'", name)));
            }
        }
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::Workflow(format!("edge from unknown node '{}'", from)));
            }
            let targets: Vec<&'static str> = match edge {
                Edge::Direct(to) => vec![*to],
                Edge::Conditional { branches, .. } => branches.values().copied().collect(),
            };
            for to in targets {
                if !self.nodes.contains_key(to) {
                    return Err(Error::Workflow(format!(
                        "edge '{}' -> '{}' targets unknown node",
                        from, to
                    )));
                }
            }
        }
        for name in self.nodes.keys() {
            if *name != finish && !self.edges.contains_key(name) {
                return Err(Error::Workflow(format!("node '{}' has no outgoing edge", name)));
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            finish,
        })
    }
}

/// Validated, runnable graph
pub struct CompiledGraph {
    nodes: HashMap<&'static str, Arc<dyn Node>>,
    edges: HashMap<&'static str, Edge>,
    entry: &'static str,
    finish: &'static str,
}

impl CompiledGraph {
    pub async fn invoke(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut current = self.entry;
        for _ in 0..MAX_STEPS {
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| Error::Workflow(format!("unknown node '{}'", current)))?;
            run_logged(node.as_ref(), state, cancel).await;

            if current == self.finish {
                return Ok(());
            }

            current = match self.edges.get(current) {
                Some(Edge::Direct(to)) => *to,
                Some(Edge::Conditional { router, branches }) => {
                    let label = router(state);
                    branches.get(label).copied().ok_or_else(|| {
                        Error::Workflow(format!("no branch '{}' after '{}'", label, current))
                    })?
                }
                None => {
                    return Err(Error::Workflow(format!(
                        "node '{}' has no outgoing edge",
                        current
                    )));
                }
            };
        }
        Err(Error::Workflow(format!(
            "graph did not finish within {} steps",
            MAX_STEPS
        )))
    }
}

/// classify -> (document_search | complaint_processing | general_chat) -> format_response
pub struct GraphWorkflow {
    graph: CompiledGraph,
}

impl GraphWorkflow {
    pub fn new(steps: Arc<Steps>) -> Result<Self> {
        tracing::info!("Building graph workflow");
        let mut graph = StateGraph::new();
        graph
            .add_node("classify", steps.classification.clone())
            .add_node(Handler::DocumentSearch.name(), steps.document_search.clone())
            .add_node(Handler::ComplaintProcessing.name(), steps.complaint.clone())
            .add_node(Handler::GeneralChat.name(), steps.general_chat.clone())
            .add_node("format_response", steps.formatting.clone())
            .set_entry_point("classify")
            .add_conditional_edges(
                "classify",
                Box::new(|state: &mut ConversationState| route_state(state).name()),
                &Handler::ALL.map(|h| (h.name(), h.name())),
            )
            .set_finish_point("format_response");
        for handler in Handler::ALL {
            graph.add_edge(handler.name(), "format_response");
        }

        Ok(Self {
            graph: graph.compile()?,
        })
    }
}

#[async_trait]
impl Workflow for GraphWorkflow {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Graph
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(user_id = %state.user_id, "Executing graph workflow");
        self.graph.invoke(state, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::nodes::Toolbox;
    use crate::state::{Intent, ProcessingStep};
    use crate::testing::{FakeComplaints, FakeDocuments, ScriptedModel, chunk};
    use crate::tools::{ComplaintTool, DocumentTool, LlmTool};
    use crate::workflow::SequentialWorkflow;

    struct Mark(&'static str);

    #[async_trait]
    impl Node for Mark {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, state: &mut ConversationState, _cancel: &CancellationToken) {
            let visited = state
                .metadata
                .entry("visited")
                .or_insert_with(|| serde_json::json!([]));
            if let Some(list) = visited.as_array_mut() {
                list.push(self.0.into());
            }
        }
    }

    fn visited(state: &ConversationState) -> Vec<String> {
        state.metadata["visited"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_conditional_edges() {
        let mut graph = StateGraph::new();
        graph
            .add_node("start", Arc::new(Mark("start")))
            .add_node("left", Arc::new(Mark("left")))
            .add_node("right", Arc::new(Mark("right")))
            .add_node("end", Arc::new(Mark("end")))
            .set_entry_point("start")
            .add_conditional_edges(
                "start",
                Box::new(|state: &mut ConversationState| {
                    if state.user_message == "l" { "go_left" } else { "go_right" }
                }),
                &[("go_left", "left"), ("go_right", "right")],
            )
            .add_edge("left", "end")
            .add_edge("right", "end")
            .set_finish_point("end");
        let graph = graph.compile().unwrap();

        let mut s = ConversationState::initialize("l", "u", None, vec![], 3);
        graph.invoke(&mut s, &CancellationToken::new()).await.unwrap();
        assert_eq!(visited(&s), vec!["start", "left", "end"]);

        let mut s = ConversationState::initialize("r", "u", None, vec![], 3);
        graph.invoke(&mut s, &CancellationToken::new()).await.unwrap();
        assert_eq!(visited(&s), vec!["start", "right", "end"]);
    }

    #[test]
    fn test_compile_rejects_bad_wiring() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", Arc::new(Mark("a")))
            .set_entry_point("a")
            .set_finish_point("b");
        assert!(graph.compile().is_err());

        let mut graph = StateGraph::new();
        graph
            .add_node("a", Arc::new(Mark("a")))
            .add_node("b", Arc::new(Mark("b")))
            .set_entry_point("a")
            .set_finish_point("b");
        let err = graph.compile().err().unwrap();
        assert!(err.to_string().contains("no outgoing edge"));
    }

    #[tokio::test]
    async fn test_cycle_hits_step_limit() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", Arc::new(Mark("a")))
            .add_node("b", Arc::new(Mark("b")))
            .add_node("end", Arc::new(Mark("end")))
            .add_edge("a", "b")
            .add_edge("b", "a")
            .set_entry_point("a")
            .set_finish_point("end");
        let graph = graph.compile().unwrap();
        let mut s = ConversationState::initialize("x", "u", None, vec![], 3);
        let err = graph.invoke(&mut s, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    /// Each scenario gets fresh collaborators so both modes see identical inputs
    fn build_steps(replies: &[&str], chunks: Vec<crate::services::DocumentChunk>) -> Arc<Steps> {
        let config = EngineConfig::default();
        let tools = Toolbox::default()
            .with_llm(LlmTool::new(Arc::new(ScriptedModel::sequence(replies)), &config))
            .with_document(DocumentTool::new(Arc::new(FakeDocuments::with_chunks(chunks))))
            .with_complaint(ComplaintTool::new(Arc::new(FakeComplaints::new())));
        Arc::new(Steps::new(&tools, &config))
    }

    #[tokio::test]
    async fn test_graph_and_sequential_are_equivalent() {
        let exam = || vec![chunk("Exámenes finales: 1 al 15 de julio.", 0.85, "calendario.pdf")];
        let scenarios: Vec<(&str, Vec<&str>, Vec<crate::services::DocumentChunk>)> = vec![
            (
                "¿Cuándo son los exámenes finales?",
                vec![r#"{"intent": "pregunta", "confidence": 0.9}"#, "Del 1 al 15 de julio."],
                exam(),
            ),
            (
                "¿Cuándo abre la piscina?",
                vec![r#"{"intent": "pregunta", "confidence": 0.8}"#, "NO_INFO"],
                exam(),
            ),
            (
                "el wifi no funciona en la biblioteca",
                vec![r#"{"intent": "queja", "confidence": 0.9}"#],
                vec![],
            ),
            (
                "hola",
                vec![r#"{"intent": "conversacion"}"#, "¡Hola! ¿En qué te ayudo?"],
                vec![],
            ),
            ("???", vec!["ni idea", "Cuéntame más."], vec![]),
            ("", vec!["no se usa"], vec![]),
        ];

        for (message, replies, chunks) in scenarios {
            let graph = GraphWorkflow::new(build_steps(&replies, chunks.clone())).unwrap();
            let sequential = SequentialWorkflow::new(build_steps(&replies, chunks));

            let initial = ConversationState::initialize(message, "u-1", None, vec![], 3);
            let mut a = initial.clone();
            let mut b = initial;
            graph.run(&mut a, &CancellationToken::new()).await.unwrap();
            sequential.run(&mut b, &CancellationToken::new()).await.unwrap();

            assert_eq!(a.response, b.response, "{}", message);
            assert_eq!(a.intent, b.intent, "{}", message);
            assert_eq!(a.tool_type, b.tool_type, "{}", message);
            assert_eq!(a.tool_success, b.tool_success, "{}", message);
            assert_eq!(a.confidence, b.confidence, "{}", message);
            assert_eq!(a.sources, b.sources, "{}", message);
            assert_eq!(a.processing_step, ProcessingStep::Formatted);
            assert_eq!(b.processing_step, ProcessingStep::Formatted);
        }
    }

    #[tokio::test]
    async fn test_unknown_intent_goes_to_general_chat() {
        let workflow = GraphWorkflow::new(build_steps(&["???", "Cuéntame más."], vec![])).unwrap();
        let mut s = ConversationState::initialize("algo raro", "u", None, vec![], 3);
        workflow.run(&mut s, &CancellationToken::new()).await.unwrap();
        assert_eq!(s.intent, Some(Intent::Unknown));
        assert_eq!(s.response.as_deref(), Some("Cuéntame más."));
    }
}
