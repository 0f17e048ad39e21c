use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Node;
use crate::state::ConversationState;
use crate::tool::ToolType;
use crate::tools::ComplaintTool;

/// Confidence of a stored complaint
const SUBMITTED_CONFIDENCE: f32 = 0.95;

const FAILURE_CONFIDENCE: f32 = 0.3;

/// Files the user's message as a complaint
pub struct ComplaintNode {
    complaint: Option<Arc<ComplaintTool>>,
}

impl ComplaintNode {
    pub fn new(complaint: Option<Arc<ComplaintTool>>) -> Self {
        Self { complaint }
    }
}

fn failed(state: &mut ConversationState, kind: Option<&str>, reason: String) {
    let mut result = Map::new();
    if let Some(kind) = kind {
        result.insert("type".into(), Value::from(kind));
    }
    result.insert("error".into(), Value::from(reason));
    state.update_tool_result(ToolType::Complaint, result, false, FAILURE_CONFIDENCE, vec![]);
}

#[async_trait]
impl Node for ComplaintNode {
    fn name(&self) -> &'static str {
        "ComplaintProcessingNode"
    }

    async fn run(&self, state: &mut ConversationState, cancel: &CancellationToken) {
        if state.user_message.trim().is_empty() {
            failed(state, None, "No complaint message provided".into());
            return;
        }
        let Some(complaint) = &self.complaint else {
            failed(state, None, "Complaint processing not available".into());
            return;
        };

        let submitted = complaint
            .submit_quick_complaint(
                &state.user_message,
                state.user(),
                state.conversation_id.as_deref(),
                cancel,
            )
            .await;

        if !submitted.success {
            let reason = submitted
                .error_message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!(node = self.name(), user_id = %state.user_id, error = %reason, "Node failed");
            failed(state, Some("complaint_failed"), reason.clone());
            state.add_error(
                "complaint_processing_error",
                format!("Complaint processing failed: {}", reason),
                submitted.error_details.clone(),
            );
            return;
        }

        let mut result = Map::new();
        result.insert("type".into(), Value::from("complaint_submitted"));
        for (to, from) in [
            ("complaint_id", "id"),
            ("short_id", "short_id"),
            ("title", "title"),
            ("category", "category"),
            ("priority", "priority"),
        ] {
            if let Some(value) = submitted.data.get(from) {
                result.insert(to.into(), value.clone());
            }
        }
        state.update_tool_result(
            ToolType::Complaint,
            result,
            true,
            SUBMITTED_CONFIDENCE,
            vec![],
        );
    }
}
