use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

use super::Node;
use crate::config::{EngineConfig, Sampling};
use crate::replies::NO_INFORMATION;
use crate::state::ConversationState;
use crate::tool::{ToolResult, ToolType, preview};
use crate::tools::{DocumentTool, LlmTool};

/// Phrase the grounded-answer prompt asks the model to emit when the
/// documents do not cover the question
pub const NO_INFO_SENTINEL: &str = "NO_INFO";

/// Confidence for every unsuccessful search
const FAILURE_CONFIDENCE: f32 = 0.3;

/// Upper bound on the confidence of a grounded answer
const MAX_ANSWER_CONFIDENCE: f32 = 0.9;

/// Outputs that mean "the documents don't answer this"
static NO_INFO_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bNO_INFO\b",
        r"(?i)\bno\s+(?:tengo|encontr[ée]|hay|existe|dispongo\s+de|cuento\s+con|contienen?|incluyen?|mencionan?)\s+(?:suficiente\s+|ninguna\s+|datos\s+ni\s+)?informaci[óo]n",
        r"(?i)\b(?:documentos?|textos?)\s+(?:oficiales\s+|proporcionados\s+)?no\s+(?:contienen?|incluyen?|mencionan?|abordan?|tratan?|responden?|especifican?)\b",
        r"(?i)^\W*lo\s+siento,?\s+(?:pero\s+)?no\b",
        r"(?i)\b(?:do\s+not|don't|cannot|can't|could\s+not|couldn't)\s+(?:have|find)\s+(?:any\s+|enough\s+)?information\b",
        r"(?i)\bno\s+(?:relevant\s+)?information\s+(?:is\s+)?(?:available|provided|found)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Whether a synthesis output is the sentinel or carries no answer
pub fn is_no_info(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || NO_INFO_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Retrieves document chunks for a question and synthesizes an answer
/// grounded only in them
pub struct DocumentSearchNode {
    document: Option<Arc<DocumentTool>>,
    llm: Option<Arc<LlmTool>>,
    search_limit: usize,
    similarity_threshold: f32,
    synthesis: Sampling,
    institution: String,
    language: String,
}

impl DocumentSearchNode {
    pub fn new(
        document: Option<Arc<DocumentTool>>,
        llm: Option<Arc<LlmTool>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            document,
            llm,
            search_limit: config.search_limit,
            similarity_threshold: config.similarity_threshold,
            synthesis: config.synthesis,
            institution: config.institution.clone(),
            language: config.language.clone(),
        }
    }

    fn synthesis_prompt(&self, question: &str, documents: &str) -> String {
        format!(
            "Eres el asistente de {institution}. Responde la pregunta del estudiante usando ÚNICAMENTE los documentos oficiales de abajo.

Documentos oficiales:
{documents}

Pregunta del estudiante: {question}

Instrucciones:
- Responde solo si los documentos tratan directamente la pregunta.
- Si los documentos no contienen la respuesta, responde exactamente: {NO_INFO_SENTINEL}
- No agregues datos que no estén en los documentos.
- Responde en {language}, de forma breve y clara.

Respuesta:",
            institution = self.institution,
            language = self.language,
        )
    }

    /// Ask the model for a grounded answer. `None` when the model is absent
    /// or the call failed; retrieved text is never shown unsynthesized.
    async fn synthesize(
        &self,
        question: &str,
        documents: &str,
        cancel: &CancellationToken,
    ) -> Option<ToolResult> {
        let llm = self.llm.as_ref()?;
        let prompt = self.synthesis_prompt(question, documents);
        let result = llm
            .generate(
                &prompt,
                self.synthesis.max_tokens,
                self.synthesis.temperature,
                cancel,
            )
            .await;
        if result.success {
            Some(result)
        } else {
            tracing::warn!(
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "Answer synthesis failed"
            );
            None
        }
    }
}

fn no_documents(state: &mut ConversationState, kind: &str) {
    let mut result = Map::new();
    result.insert("type".into(), Value::from(kind));
    result.insert("message".into(), Value::from(NO_INFORMATION));
    state.update_tool_result(ToolType::Document, result, false, FAILURE_CONFIDENCE, vec![]);
}

fn unavailable(state: &mut ConversationState, reason: &str) {
    let mut result = Map::new();
    result.insert("error".into(), Value::from(reason));
    state.update_tool_result(ToolType::Document, result, false, FAILURE_CONFIDENCE, vec![]);
}

#[async_trait]
impl Node for DocumentSearchNode {
    fn name(&self) -> &'static str {
        "DocumentSearchNode"
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) {
        let question = state.user_message.trim().to_string();
        if question.is_empty() {
            unavailable(state, "No search query provided");
            return;
        }
        let Some(document) = &self.document else {
            unavailable(state, "Document search not available");
            return;
        };

        let search = document
            .search(&question, self.search_limit, self.similarity_threshold, cancel)
            .await;

        if search.error_type.is_some() {
            let message = search
                .error_message
                .clone()
                .unwrap_or_else(|| "Document search failed".to_string());
            tracing::error!(node = self.name(), user_id = %state.user_id, error = %message, "Node failed");
            unavailable(state, &message);
            state.add_error("document_search_error", message, search.error_details.clone());
            return;
        }

        let content = search.str_field("content").unwrap_or_default().to_string();
        if !search.success || content.is_empty() {
            no_documents(state, "no_documents_found");
            return;
        }

        let best_similarity = search
            .data
            .get("best_similarity")
            .and_then(Value::as_f64)
            .unwrap_or(search.confidence as f64) as f32;
        let chunks_found = search.data.get("chunks_found").cloned().unwrap_or(json!(0));

        let Some(reply) = self.synthesize(&question, &content, cancel).await else {
            state
                .metadata
                .insert("grounding".into(), Value::from("unavailable"));
            no_documents(state, "synthesis_unavailable");
            return;
        };
        let answer = reply.str_field("response").unwrap_or_default().to_string();
        if is_no_info(&answer) {
            tracing::info!(
                question = %preview(&question, 50),
                best_similarity,
                "Documents do not answer the question"
            );
            state
                .metadata
                .insert("grounding".into(), Value::from("no_info"));
            no_documents(state, "no_relevant_information");
            return;
        }
        let confidence = (best_similarity + 0.1).min(MAX_ANSWER_CONFIDENCE);

        state
            .metadata
            .insert("grounding".into(), Value::from("synthesized"));

        let mut result = Map::new();
        result.insert("type".into(), Value::from("document_search"));
        result.insert("answer".into(), Value::from(answer));
        result.insert("content".into(), Value::from(content));
        result.insert("chunks_found".into(), chunks_found);
        result.insert("best_similarity".into(), json!(best_similarity));
        state.update_tool_result(
            ToolType::Document,
            result,
            true,
            confidence,
            search.sources.clone(),
        );
    }
}
