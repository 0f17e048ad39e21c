//! Conversation state threaded through the pipeline.
//!
//! One `ConversationState` is created per user turn, mutated in place by each
//! step, and dropped once it has been converted into a caller-facing response.

use aula_ai::ChatTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tool::ToolType;

/// Classified purpose of a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Question answerable from institutional documents
    Question,
    /// Problem report to be filed
    Complaint,
    /// Greetings, thanks, small talk
    General,
    /// The model answered but nothing could be parsed
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Question,
        Intent::Complaint,
        Intent::General,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Question => "question",
            Intent::Complaint => "complaint",
            Intent::General => "general",
            Intent::Unknown => "unknown",
        }
    }

    /// Map a label emitted by the classification prompt
    pub fn from_label(label: &str) -> Intent {
        match label.trim().to_lowercase().as_str() {
            "pregunta" | "question" => Intent::Question,
            "queja" | "complaint" => Intent::Complaint,
            "conversacion" | "conversación" | "general" => Intent::General,
            _ => Intent::Unknown,
        }
    }
}

/// Pipeline position marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Initialized,
    Classified,
    Routed,
    Executed,
    Formatted,
    Failed,
    Reset,
}

impl ProcessingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStep::Initialized => "initialized",
            ProcessingStep::Classified => "classified",
            ProcessingStep::Routed => "routed",
            ProcessingStep::Executed => "executed",
            ProcessingStep::Formatted => "formatted",
            ProcessingStep::Failed => "failed",
            ProcessingStep::Reset => "reset",
        }
    }
}

/// Failure recorded on the state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub details: Map<String, Value>,
    /// Step the pipeline was at when the error was recorded
    pub step: ProcessingStep,
    pub timestamp: DateTime<Utc>,
}

/// The mutable per-turn record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub user_message: String,
    /// Empty when the caller is anonymous
    pub user_id: String,
    pub conversation_id: Option<String>,
    /// Prior turns, read-only context
    pub history: Vec<ChatTurn>,

    pub intent: Option<Intent>,
    pub intent_confidence: f32,
    pub processing_step: ProcessingStep,

    pub tool_type: Option<ToolType>,
    pub tool_result: Option<Map<String, Value>>,
    pub tool_success: bool,

    pub sources: Vec<String>,
    pub response: Option<String>,
    pub confidence: f32,
    pub suggested_actions: Vec<String>,

    pub error_info: Option<ErrorInfo>,
    /// Diagnostics only; never consulted for control flow
    pub metadata: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of the key fields, for logs and health output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub user_id: String,
    pub message_length: usize,
    pub intent: Option<Intent>,
    pub intent_confidence: f32,
    pub processing_step: ProcessingStep,
    pub tool_type: Option<ToolType>,
    pub tool_success: bool,
    pub has_response: bool,
    pub sources_count: usize,
    pub confidence: f32,
    pub has_error: bool,
}

impl ConversationState {
    /// Build the initial state for one turn. `history` is trimmed to the
    /// most recent `history_window` turns.
    pub fn initialize(
        user_message: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: Option<String>,
        mut history: Vec<ChatTurn>,
        history_window: usize,
    ) -> Self {
        if history.len() > history_window {
            history.drain(..history.len() - history_window);
        }
        Self {
            user_message: user_message.into(),
            user_id: user_id.into(),
            conversation_id,
            history,
            intent: None,
            intent_confidence: 0.0,
            processing_step: ProcessingStep::Initialized,
            tool_type: None,
            tool_result: None,
            tool_success: false,
            sources: Vec::new(),
            response: None,
            confidence: 0.0,
            suggested_actions: Vec::new(),
            error_info: None,
            metadata: Map::new(),
            updated_at: Utc::now(),
        }
    }

    /// The user id, or `None` for anonymous callers
    pub fn user(&self) -> Option<&str> {
        let id = self.user_id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn update_intent(&mut self, intent: Intent, confidence: f32) {
        self.intent = Some(intent);
        self.intent_confidence = confidence.clamp(0.0, 1.0);
        self.processing_step = ProcessingStep::Classified;
        self.updated_at = Utc::now();

        tracing::info!(
            intent = intent.as_str(),
            confidence = self.intent_confidence,
            user_id = %self.user_id,
            "Intent updated"
        );
    }

    pub fn mark_routed(&mut self) {
        self.processing_step = ProcessingStep::Routed;
        self.updated_at = Utc::now();
    }

    /// Record the outcome of an execution step. An unsuccessful result
    /// always carries an `error` entry.
    pub fn update_tool_result(
        &mut self,
        tool_type: ToolType,
        mut result: Map<String, Value>,
        success: bool,
        confidence: f32,
        sources: Vec<String>,
    ) {
        if !success && !result.contains_key("error") {
            let reason = result
                .get("message")
                .cloned()
                .unwrap_or_else(|| Value::from("tool execution unsuccessful"));
            result.insert("error".to_string(), reason);
        }

        tracing::info!(
            tool_type = tool_type.as_str(),
            success,
            sources_count = sources.len(),
            user_id = %self.user_id,
            "Tool result updated"
        );

        self.tool_type = Some(tool_type);
        self.tool_result = Some(result);
        self.tool_success = success;
        self.confidence = confidence.clamp(0.0, 1.0);
        if !sources.is_empty() {
            self.sources = sources;
        }
        self.processing_step = ProcessingStep::Executed;
        self.updated_at = Utc::now();
    }

    pub fn update_response(
        &mut self,
        response: impl Into<String>,
        confidence: f32,
        suggested_actions: Vec<String>,
    ) {
        let response = response.into();
        tracing::info!(
            response_length = response.len(),
            confidence,
            actions_count = suggested_actions.len(),
            user_id = %self.user_id,
            "Response updated"
        );

        self.response = Some(response);
        self.confidence = confidence.clamp(0.0, 1.0);
        if !suggested_actions.is_empty() {
            self.suggested_actions = suggested_actions;
        }
        self.processing_step = ProcessingStep::Formatted;
        self.updated_at = Utc::now();
    }

    pub fn add_error(
        &mut self,
        error_type: impl Into<String>,
        message: impl Into<String>,
        details: Map<String, Value>,
    ) {
        let info = ErrorInfo {
            error_type: error_type.into(),
            message: message.into(),
            details,
            step: self.processing_step,
            timestamp: Utc::now(),
        };

        tracing::error!(
            error_type = %info.error_type,
            error_message = %info.message,
            processing_step = info.step.as_str(),
            user_id = %self.user_id,
            "Error added to state"
        );

        self.error_info = Some(info);
    }

    /// Required input fields are present
    pub fn validate(&self) -> bool {
        if self.user_message.trim().is_empty() {
            tracing::warn!(missing_field = "user_message", user_id = %self.user_id, "State validation failed");
            return false;
        }
        true
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            user_id: self.user_id.clone(),
            message_length: self.user_message.chars().count(),
            intent: self.intent,
            intent_confidence: self.intent_confidence,
            processing_step: self.processing_step,
            tool_type: self.tool_type,
            tool_success: self.tool_success,
            has_response: self.response.as_deref().is_some_and(|r| !r.is_empty()),
            sources_count: self.sources.len(),
            confidence: self.confidence,
            has_error: self.error_info.is_some(),
        }
    }

    pub fn is_ready_for_response(&self) -> bool {
        self.intent.is_some() && self.tool_result.is_some() && self.tool_success
    }

    /// Clear processing fields, keeping the input, so the turn can be replayed
    pub fn reset_processing(&mut self) {
        self.intent = None;
        self.intent_confidence = 0.0;
        self.processing_step = ProcessingStep::Reset;
        self.tool_type = None;
        self.tool_result = None;
        self.tool_success = false;
        self.response = None;
        self.sources.clear();
        self.confidence = 0.0;
        self.suggested_actions.clear();
        self.error_info = None;
        self.updated_at = Utc::now();

        tracing::info!(user_id = %self.user_id, "Processing state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(msg: &str) -> ConversationState {
        ConversationState::initialize(msg, "user-1", None, vec![], 3)
    }

    #[test]
    fn test_initialize_defaults() {
        let s = state("hola");
        assert_eq!(s.processing_step, ProcessingStep::Initialized);
        assert!(s.intent.is_none());
        assert!(s.tool_result.is_none());
        assert!(!s.tool_success);
        assert!(s.response.is_none());
        assert!(s.validate());
    }

    #[test]
    fn test_initialize_trims_history_to_window() {
        let history: Vec<ChatTurn> = (0..6).map(|i| ChatTurn::user(format!("m{}", i))).collect();
        let s = ConversationState::initialize("x", "u", None, history, 3);
        let contents: Vec<_> = s.history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4", "m5"]);
    }

    #[test]
    fn test_user_is_none_when_blank() {
        let s = ConversationState::initialize("x", "  ", None, vec![], 3);
        assert!(s.user().is_none());
        assert_eq!(state("x").user(), Some("user-1"));
    }

    #[test]
    fn test_update_intent_clamps() {
        let mut s = state("x");
        s.update_intent(Intent::Question, 1.7);
        assert_eq!(s.intent, Some(Intent::Question));
        assert_eq!(s.intent_confidence, 1.0);
        assert_eq!(s.processing_step, ProcessingStep::Classified);
    }

    #[test]
    fn test_failed_tool_result_gets_error_key() {
        let mut s = state("x");
        let mut result = Map::new();
        result.insert("message".into(), json!("nothing found"));
        s.update_tool_result(ToolType::Document, result, false, 0.3, vec![]);
        let result = s.tool_result.as_ref().unwrap();
        assert_eq!(result["error"], "nothing found");
        assert_eq!(s.processing_step, ProcessingStep::Executed);
        assert_eq!(s.confidence, 0.3);
    }

    #[test]
    fn test_update_response_keeps_actions_when_empty() {
        let mut s = state("x");
        s.update_response("first", 0.8, vec!["a".into()]);
        s.update_response("second", 0.5, vec![]);
        assert_eq!(s.response.as_deref(), Some("second"));
        assert_eq!(s.suggested_actions, vec!["a".to_string()]);
        assert_eq!(s.processing_step, ProcessingStep::Formatted);
    }

    #[test]
    fn test_add_error_records_step() {
        let mut s = state("x");
        s.update_intent(Intent::General, 0.5);
        s.add_error("classification_error", "boom", Map::new());
        let info = s.error_info.as_ref().unwrap();
        assert_eq!(info.step, ProcessingStep::Classified);
        assert_eq!(info.error_type, "classification_error");
        assert!(s.summary().has_error);
    }

    #[test]
    fn test_ready_and_reset() {
        let mut s = state("x");
        s.update_intent(Intent::Complaint, 0.9);
        s.update_tool_result(ToolType::Complaint, Map::new(), true, 0.95, vec![]);
        assert!(s.is_ready_for_response());

        s.reset_processing();
        assert!(!s.is_ready_for_response());
        assert_eq!(s.processing_step, ProcessingStep::Reset);
        assert_eq!(s.user_message, "x");
    }

    #[test]
    fn test_intent_from_label() {
        assert_eq!(Intent::from_label("Pregunta"), Intent::Question);
        assert_eq!(Intent::from_label("queja"), Intent::Complaint);
        assert_eq!(Intent::from_label("conversacion"), Intent::General);
        assert_eq!(Intent::from_label("general"), Intent::General);
        assert_eq!(Intent::from_label("otra cosa"), Intent::Unknown);
    }

    #[test]
    fn test_error_info_serializes_type_field() {
        let mut s = state("x");
        s.add_error("workflow_error", "boom", Map::new());
        let json = serde_json::to_value(s.error_info.unwrap()).unwrap();
        assert_eq!(json["type"], "workflow_error");
        assert_eq!(json["step"], "initialized");
    }
}
