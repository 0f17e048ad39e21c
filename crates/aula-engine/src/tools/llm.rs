//! Language-model adapter: intent classification and text generation

use async_trait::async_trait;
use aula_ai::{ChatTurn, LanguageModel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, Sampling};
use crate::error::{ErrorKind, ToolExecutionError};
use crate::state::Intent;
use crate::tool::{
    Timed, Tool, ToolResult, ToolType, cancellable, instrumented, preview, sanitize, timed,
};

/// Confidence attached to every generated reply
const GENERATION_CONFIDENCE: f32 = 0.8;

/// Confidence of the keyword classifier used when the model call fails
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Prior turns included in classification and persona prompts
const PROMPT_HISTORY: usize = 3;

/// Only replies longer than this are cached
const MIN_CACHEABLE_LEN: usize = 10;

const HEALTH_PROBE: &str = "Responde con 'OK' si puedes procesar este mensaje.";

const QUESTION_WORDS: &[&str] = &[
    "cómo",
    "cuándo",
    "dónde",
    "qué",
    "quién",
    "por qué",
    "procedimiento",
    "trámite",
    "registro",
    "matrícula",
];

const COMPLAINT_WORDS: &[&str] = &[
    "problema",
    "issue",
    "error",
    "falla",
    "no funciona",
    "mal",
    "deficiente",
    "queja",
    "reclamo",
];

/// Outcome of intent classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f32,
    pub reasoning: String,
    /// Provider name, or `"fallback"` when the keyword classifier answered
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ms: Option<u64>,
}

impl IntentClassification {
    pub fn is_fallback(&self) -> bool {
        self.model_used == "fallback"
    }
}

impl Timed for IntentClassification {
    fn success(&self) -> bool {
        !self.is_fallback()
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn set_execution_ms(&mut self, ms: u64) {
        self.execution_ms = Some(ms);
    }
}

/// Wraps a [`LanguageModel`] with prompt building, parsing and a bounded
/// response cache. Safe to share across concurrent turns.
pub struct LlmTool {
    model: Arc<dyn LanguageModel>,
    institution: String,
    language: String,
    classification: Sampling,
    chat: Sampling,
    cache: Mutex<HashMap<String, String>>,
    cache_capacity: usize,
}

impl LlmTool {
    pub fn new(model: Arc<dyn LanguageModel>, config: &EngineConfig) -> Self {
        Self {
            model,
            institution: config.institution.clone(),
            language: config.language.clone(),
            classification: config.classification,
            chat: config.chat,
            cache: Mutex::new(HashMap::new()),
            cache_capacity: config.llm_cache_size,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.model.provider_name()
    }

    /// Classify a message. Model failures degrade to the keyword classifier
    /// at [`FALLBACK_CONFIDENCE`]; only empty input and cancellation are
    /// returned as errors.
    pub async fn classify_intent(
        &self,
        user_message: &str,
        history: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> Result<IntentClassification, ToolExecutionError> {
        let params = json!({
            "user_message": sanitize(user_message),
            "history_turns": history.len(),
        });
        timed(self.name(), "classify_intent", params, async {
            let message = user_message.trim();
            if message.is_empty() {
                return Err(ToolExecutionError::invalid_input("User message cannot be empty")
                    .with_detail("user_message", user_message));
            }

            let prompt = self.classification_prompt(message, history);
            tracing::info!(
                message = %preview(message, 50),
                has_history = !history.is_empty(),
                "Classifying user intent"
            );

            let reply = cancellable(
                cancel,
                self.model.generate_text(
                    &prompt,
                    self.classification.max_tokens,
                    self.classification.temperature,
                ),
            )
            .await?;

            match reply {
                Ok(text) => {
                    let (intent, confidence, reasoning) = parse_classification_response(&text);
                    tracing::info!(
                        message = %preview(message, 50),
                        intent = intent.as_str(),
                        confidence,
                        "Intent classification completed"
                    );
                    Ok(IntentClassification {
                        intent,
                        confidence,
                        reasoning,
                        model_used: self.model.provider_name().to_string(),
                        execution_ms: None,
                    })
                }
                Err(e) => {
                    let intent = keyword_intent(message);
                    tracing::warn!(
                        error = %e,
                        fallback_intent = intent.as_str(),
                        "Intent classification failed, using fallback classification"
                    );
                    Ok(IntentClassification {
                        intent,
                        confidence: FALLBACK_CONFIDENCE,
                        reasoning: "Fallback classification due to LLM error".into(),
                        model_used: "fallback".into(),
                        execution_ms: None,
                    })
                }
            }
        })
        .await
        .0
    }

    /// Generate text. Repeated prompts with the same parameters are served
    /// from the cache and flagged `cached=true`.
    pub async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let params = json!({
            "prompt": sanitize(prompt),
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        instrumented(self.name(), ToolType::Llm, "generate", params, async {
            let prompt = prompt.trim();
            if prompt.is_empty() {
                return Err(ToolExecutionError::invalid_input("Prompt cannot be empty")
                    .with_detail("prompt", prompt));
            }
            if max_tokens == 0 || max_tokens > 1000 {
                return Err(ToolExecutionError::invalid_input(
                    "Max tokens must be between 1 and 1000",
                )
                .with_detail("max_tokens", max_tokens));
            }
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ToolExecutionError::invalid_input(
                    "Temperature must be between 0.0 and 1.0",
                )
                .with_detail("temperature", temperature));
            }

            let key = cache_key(prompt, max_tokens, temperature);
            let cached = self.cache.lock().get(&key).cloned();
            if let Some(hit) = cached {
                tracing::debug!(prompt = %preview(prompt, 50), "Using cached response");
                return Ok(self.reply_result(hit, prompt, true, 0));
            }

            tracing::info!(
                prompt = %preview(prompt, 50),
                max_tokens,
                temperature,
                "Generating LLM response"
            );

            let text = cancellable(
                cancel,
                self.model.generate_text(prompt, max_tokens, temperature),
            )
            .await?
            .map_err(|e| {
                ToolExecutionError::from_ai("LLM response generation failed", &e)
                    .with_detail("prompt", sanitize(prompt))
                    .with_detail("max_tokens", max_tokens)
                    .with_detail("temperature", temperature)
            })?;

            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(ToolExecutionError::new(
                    ErrorKind::EmptyResponse,
                    "LLM returned empty response",
                )
                .with_detail("prompt", sanitize(prompt)));
            }

            if text.chars().count() > MIN_CACHEABLE_LEN {
                self.store(key, text.clone());
            }

            let estimated_tokens = text.split_whitespace().count() + prompt.split_whitespace().count();
            Ok(self.reply_result(text, prompt, false, estimated_tokens))
        })
        .await
    }

    /// Reply in the institution's persona
    pub async fn generate_persona_reply(
        &self,
        user_message: &str,
        history: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> ToolResult {
        let prompt = persona_prompt(&self.institution, &self.language, user_message, history);
        self.generate(&prompt, self.chat.max_tokens, self.chat.temperature, cancel)
            .await
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        tracing::info!("LLM response cache cleared");
    }

    fn store(&self, key: String, text: String) {
        if self.cache_capacity == 0 {
            return;
        }
        let mut cache = self.cache.lock();
        if cache.len() >= self.cache_capacity && !cache.contains_key(&key) {
            if let Some(evicted) = cache.keys().next().cloned() {
                cache.remove(&evicted);
            }
        }
        cache.insert(key, text);
    }

    fn reply_result(&self, text: String, prompt: &str, cached: bool, tokens: usize) -> ToolResult {
        let mut data = Map::new();
        data.insert("response".into(), Value::from(text));
        data.insert("prompt".into(), Value::from(prompt));
        data.insert("cached".into(), Value::Bool(cached));
        data.insert("model_used".into(), Value::from(self.model.provider_name()));
        data.insert("tokens_used".into(), Value::from(tokens));
        ToolResult::ok(ToolType::Llm, data, GENERATION_CONFIDENCE)
    }

    fn classification_prompt(&self, message: &str, history: &[ChatTurn]) -> String {
        let prompt = format!(
            r#"Clasifica este mensaje de un estudiante de {institution}.

Categorías disponibles:
- "pregunta" - Pregunta sobre procedimientos, reglamentos, fechas límite, trámites
- "queja" - Reporte de problemas, issues, quejas sobre servicios de la universidad
- "conversacion" - Saludos, agradecimientos, conversación general

Mensaje del estudiante: "{message}"

Responde SOLO con el formato JSON:
{{"intent": "pregunta|queja|conversacion", "confidence": 0.0-1.0, "reasoning": "breve explicación"}}

Respuesta JSON:"#,
            institution = self.institution,
        );

        match history_context(history) {
            Some(context) => format!("{}\n\n{}", context, prompt),
            None => prompt,
        }
    }
}

/// The last few turns, each cut to 50 characters, as a prompt preamble
fn history_context(history: &[ChatTurn]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let start = history.len().saturating_sub(PROMPT_HISTORY);
    let context = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), preview(&turn.content, 50)))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("Contexto de conversación previa:\n{}", context))
}

fn cache_key(prompt: &str, max_tokens: u32, temperature: f32) -> String {
    format!("{}_{}_{}", prompt, max_tokens, temperature)
}

/// Persona prompt for general conversation
pub fn persona_prompt(
    institution: &str,
    language: &str,
    user_message: &str,
    history: &[ChatTurn],
) -> String {
    let prompt = format!(
        "Eres un asistente virtual útil para estudiantes de {institution}.

Responde de manera:
- Amigable y profesional
- Enfocada en estudiantes universitarios
- Específica para el contexto de {institution} cuando sea posible
- En {language} claro y natural

Estudiante: {user_message}

Respuesta del asistente:"
    );
    match history_context(history) {
        Some(context) => format!("{}\n\n{}", context, prompt),
        None => prompt,
    }
}

/// Two-stage parse of the model's classification answer: the first balanced
/// `{...}` as JSON, else label keywords in the raw text, else `Unknown`.
pub fn parse_classification_response(response: &str) -> (Intent, f32, String) {
    if let Some(candidate) = first_json_object(response) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(parsed)) => {
                let intent = parsed
                    .get("intent")
                    .and_then(Value::as_str)
                    .map(Intent::from_label)
                    .unwrap_or(Intent::Unknown);
                let confidence = parsed
                    .get("confidence")
                    .and_then(number)
                    .unwrap_or(0.5) as f32;
                let reasoning = parsed
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return (intent, confidence.clamp(0.0, 1.0), reasoning);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    response = %preview(response, 100),
                    error = %e,
                    "Failed to parse classification response JSON"
                );
            }
        }
    }

    let lower = response.to_lowercase();
    let keyword = "Keyword-based classification".to_string();
    if lower.contains("pregunta") {
        (Intent::Question, 0.6, keyword)
    } else if lower.contains("queja") {
        (Intent::Complaint, 0.6, keyword)
    } else if lower.contains("conversacion") {
        (Intent::General, 0.6, keyword)
    } else {
        (Intent::Unknown, 0.3, "Unable to parse classification".into())
    }
}

/// A JSON number, or a string holding one
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

/// First brace-balanced `{...}` substring
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deterministic keyword classifier over the user message
pub fn keyword_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    if QUESTION_WORDS.iter().any(|w| lower.contains(w)) {
        Intent::Question
    } else if COMPLAINT_WORDS.iter().any(|w| lower.contains(w)) {
        Intent::Complaint
    } else {
        Intent::General
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn name(&self) -> &str {
        "LLMTool"
    }

    fn tool_type(&self) -> ToolType {
        ToolType::Llm
    }

    async fn health_check(&self) -> bool {
        match self.model.generate_text(HEALTH_PROBE, 10, 0.0).await {
            Ok(text) => !text.trim().is_empty(),
            Err(e) => {
                tracing::warn!(tool = self.name(), error = %e, "LLM provider health check failed");
                false
            }
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "tool_name": self.name(),
            "tool_type": ToolType::Llm.as_str(),
            "operations": ["classify_intent", "generate", "generate_persona_reply"],
            "supported_intents": Intent::ALL.iter().map(Intent::as_str).collect::<Vec<_>>(),
            "provider": self.model.provider_name(),
            "parameters": {
                "max_tokens_range": "1-1000",
                "temperature_range": "0.0-1.0",
                "cache_size": self.cache_capacity,
            },
        })
    }
}
