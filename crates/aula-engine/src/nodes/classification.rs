use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Node;
use crate::state::{ConversationState, Intent};
use crate::tools::{LlmTool, keyword_intent};

/// Confidence when no model is configured
const NO_MODEL_CONFIDENCE: f32 = 0.3;

/// Confidence when classification itself failed
const ERROR_CONFIDENCE: f32 = 0.2;

/// Confidence for an empty message
const EMPTY_MESSAGE_CONFIDENCE: f32 = 0.5;

/// Sets `intent` and `intent_confidence` on the state
pub struct ClassificationNode {
    llm: Option<Arc<LlmTool>>,
}

impl ClassificationNode {
    pub fn new(llm: Option<Arc<LlmTool>>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for ClassificationNode {
    fn name(&self) -> &'static str {
        "ClassificationNode"
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) {
        if state.user_message.trim().is_empty() {
            state.update_intent(Intent::General, EMPTY_MESSAGE_CONFIDENCE);
            return;
        }

        let Some(llm) = &self.llm else {
            let intent = keyword_intent(&state.user_message);
            state.update_intent(intent, NO_MODEL_CONFIDENCE);
            return;
        };

        match llm
            .classify_intent(&state.user_message, &state.history, cancel)
            .await
        {
            Ok(classification) => {
                state.update_intent(classification.intent, classification.confidence);
                state.metadata.insert(
                    "classification".into(),
                    json!({
                        "model_used": classification.model_used,
                        "reasoning": classification.reasoning,
                    }),
                );
            }
            Err(e) => {
                let message = format!("Classification failed: {}", e);
                tracing::error!(node = self.name(), user_id = %state.user_id, error = %message, "Node failed");
                let intent = keyword_intent(&state.user_message);
                state.update_intent(intent, ERROR_CONFIDENCE);
                let mut details = Map::new();
                details.insert("error_kind".into(), Value::from(e.kind.as_str()));
                state.add_error("classification_error", message, details);
            }
        }
    }
}
