use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Node;
use crate::replies::{GREETING_WORDS, THANKS_REPLY, THANKS_WORDS, acknowledgment, greeting};
use crate::state::ConversationState;
use crate::tool::ToolType;
use crate::tools::LlmTool;

const GENERATED_CONFIDENCE: f32 = 0.8;

const CANNED_CONFIDENCE: f32 = 0.5;

/// Small talk: a persona reply from the model, or a canned reply when the
/// model is absent or failing
pub struct GeneralChatNode {
    llm: Option<Arc<LlmTool>>,
    institution: String,
}

impl GeneralChatNode {
    pub fn new(llm: Option<Arc<LlmTool>>, institution: &str) -> Self {
        Self {
            llm,
            institution: institution.to_string(),
        }
    }

    /// Reply chosen by substring checks on the message
    pub fn canned_reply(&self, message: &str) -> String {
        let lower = message.to_lowercase();
        if lower.trim().is_empty() || GREETING_WORDS.iter().any(|w| lower.contains(w)) {
            greeting(&self.institution)
        } else if THANKS_WORDS.iter().any(|w| lower.contains(w)) {
            THANKS_REPLY.to_string()
        } else {
            acknowledgment(&self.institution, message.trim())
        }
    }
}

#[async_trait]
impl Node for GeneralChatNode {
    fn name(&self) -> &'static str {
        "GeneralChatNode"
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) {
        let generated = match &self.llm {
            Some(llm) if !state.user_message.trim().is_empty() => {
                let reply = llm
                    .generate_persona_reply(&state.user_message, &state.history, cancel)
                    .await;
                match reply.str_field("response") {
                    Some(text) if reply.success => Some(text.to_string()),
                    _ => {
                        tracing::warn!(
                            node = self.name(),
                            error = reply.error_message.as_deref().unwrap_or("empty reply"),
                            "Persona reply failed, using canned reply"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        let mut result = Map::new();
        result.insert("type".into(), Value::from("general_chat"));
        let confidence = match generated {
            Some(text) => {
                result.insert("response".into(), Value::from(text));
                GENERATED_CONFIDENCE
            }
            None => {
                result.insert(
                    "response".into(),
                    Value::from(self.canned_reply(&state.user_message)),
                );
                result.insert("fallback".into(), Value::Bool(true));
                CANNED_CONFIDENCE
            }
        };
        state.update_tool_result(ToolType::Llm, result, true, confidence, vec![]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::ScriptedModel;

    const UP: &str = "Universidad del Pacífico";

    fn node(model: Option<&Arc<ScriptedModel>>) -> GeneralChatNode {
        GeneralChatNode::new(
            model.map(|m| Arc::new(LlmTool::new(m.clone(), &EngineConfig::default()))),
            UP,
        )
    }

    fn run_state(msg: &str) -> ConversationState {
        ConversationState::initialize(msg, "u", None, vec![], 3)
    }

    #[tokio::test]
    async fn test_generated_reply() {
        let model = Arc::new(ScriptedModel::replying("¡Hola! ¿En qué te puedo ayudar hoy?"));
        let mut s = run_state("hola");
        node(Some(&model)).run(&mut s, &CancellationToken::new()).await;

        assert!(s.tool_success);
        assert_eq!(s.tool_type, Some(ToolType::Llm));
        assert_eq!(s.confidence, 0.8);
        assert_eq!(
            s.tool_result.as_ref().unwrap()["response"],
            "¡Hola! ¿En qué te puedo ayudar hoy?"
        );
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_canned() {
        let model = Arc::new(ScriptedModel::failing());
        let mut s = run_state("muchas gracias");
        node(Some(&model)).run(&mut s, &CancellationToken::new()).await;

        assert!(s.tool_success);
        assert_eq!(s.confidence, 0.5);
        let result = s.tool_result.as_ref().unwrap();
        assert_eq!(result["response"], THANKS_REPLY);
        assert_eq!(result["fallback"], true);
    }

    #[tokio::test]
    async fn test_persona_prompt_sees_history() {
        let model = Arc::new(ScriptedModel::replying("¡Con gusto!"));
        let history = vec![
            aula_ai::ChatTurn::user("¿Dónde queda la biblioteca?"),
            aula_ai::ChatTurn::assistant("En el pabellón B."),
        ];
        let mut s = ConversationState::initialize("gracias", "u", None, history, 3);
        node(Some(&model)).run(&mut s, &CancellationToken::new()).await;

        let prompt = model.prompts().remove(0);
        assert!(prompt.contains("assistant: En el pabellón B."));
        assert!(prompt.contains("Estudiante: gracias"));
    }

    #[tokio::test]
    async fn test_empty_message_skips_model() {
        let model = Arc::new(ScriptedModel::replying("no debería llamarse"));
        let mut s = run_state("");
        node(Some(&model)).run(&mut s, &CancellationToken::new()).await;
        assert_eq!(model.calls(), 0);
        assert_eq!(s.tool_result.as_ref().unwrap()["response"], greeting(UP));
    }

    #[test]
    fn test_canned_replies() {
        let n = node(None);
        assert_eq!(n.canned_reply("Buenos días"), greeting(UP));
        assert_eq!(n.canned_reply("Gracias por todo"), THANKS_REPLY);
        assert!(n.canned_reply("me gusta el campus").contains("\"me gusta el campus\""));
    }
}
