use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio_util::sync::CancellationToken;

use super::Node;
use crate::replies::{
    ANSWER_PREFIX, APOLOGY, COMPLAINT_FAILED, NO_INFORMATION, NO_INFORMATION_GUIDANCE,
    SOURCE_LABEL, actions, complaint_confirmation,
};
use crate::state::{ConversationState, Intent};

/// Confidence of the apology used when formatting fails
pub const FAILURE_CONFIDENCE: f32 = 0.1;

/// Sources cited in the reply text
const MAX_CITED_SOURCES: usize = 2;

type Formatted = (String, Vec<String>);

/// Turns the tool outcome into the user-facing reply. Never fails: any
/// error or panic while formatting becomes a low-confidence apology.
#[derive(Default)]
pub struct FormattingNode;

impl FormattingNode {
    pub fn new() -> Self {
        Self
    }
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn field<'a>(result: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a str> {
    result.and_then(|r| r.get(key)).and_then(Value::as_str)
}

fn format_question(state: &ConversationState) -> Result<Formatted, String> {
    let result = state.tool_result.as_ref();
    if state.tool_success && field(result, "type") == Some("document_search") {
        let answer = field(result, "answer")
            .or_else(|| field(result, "content"))
            .ok_or("document result has no answer")?;
        let mut text = format!("{}\n\n{}", ANSWER_PREFIX, answer.trim());
        if !state.sources.is_empty() {
            let cited: Vec<&str> = state
                .sources
                .iter()
                .take(MAX_CITED_SOURCES)
                .map(String::as_str)
                .collect();
            text.push_str(&format!("\n\n{} {}", SOURCE_LABEL, cited.join(", ")));
        }
        Ok((text, owned(&[actions::MORE_DETAILS, actions::ANYTHING_ELSE])))
    } else {
        Ok((
            format!("{}\n\n{}", NO_INFORMATION, NO_INFORMATION_GUIDANCE),
            owned(&[
                actions::REFINE_KEYWORDS,
                actions::ASK_SPECIFIC,
                actions::REPORT_PROBLEM,
            ]),
        ))
    }
}

fn format_complaint(state: &ConversationState) -> Result<Formatted, String> {
    let result = state.tool_result.as_ref();
    if state.tool_success && field(result, "type") == Some("complaint_submitted") {
        let short_id = field(result, "short_id").unwrap_or("desconocido");
        Ok((
            complaint_confirmation(short_id),
            owned(&[actions::ANYTHING_ELSE, actions::REPORT_ANOTHER]),
        ))
    } else {
        Ok((
            COMPLAINT_FAILED.to_string(),
            owned(&[actions::RETRY_REPORT, actions::ASK_PROCEDURES]),
        ))
    }
}

fn format_general(state: &ConversationState) -> Result<Formatted, String> {
    let reply = field(state.tool_result.as_ref(), "response")
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or("general chat produced no reply")?;
    Ok((
        reply.to_string(),
        owned(&[
            actions::ASK_PROCEDURES,
            actions::SEARCH_DOCUMENTS,
            actions::REPORT_PROBLEM,
        ]),
    ))
}

/// Reply text and suggested actions for the state's intent
pub fn format_reply(state: &ConversationState) -> Result<Formatted, String> {
    match state.intent {
        Some(Intent::Question) => format_question(state),
        Some(Intent::Complaint) => format_complaint(state),
        Some(Intent::General) | Some(Intent::Unknown) | None => format_general(state),
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Node for FormattingNode {
    fn name(&self) -> &'static str {
        "ResponseFormattingNode"
    }

    async fn run(&self, state: &mut ConversationState, _cancel: &CancellationToken) {
        let outcome = catch_unwind(AssertUnwindSafe(|| format_reply(state)))
            .unwrap_or_else(|payload| Err(panic_message(payload)));

        match outcome {
            Ok((text, suggested)) => {
                let confidence = state.confidence;
                state.update_response(text, confidence, suggested);
            }
            Err(reason) => {
                let message = format!("Response formatting failed: {}", reason);
                tracing::error!(node = self.name(), user_id = %state.user_id, error = %message, "Node failed");
                state.update_response(APOLOGY, FAILURE_CONFIDENCE, owned(&[actions::REPHRASE]));
                state.add_error("response_formatting_error", message, Map::new());
            }
        }
    }
}
