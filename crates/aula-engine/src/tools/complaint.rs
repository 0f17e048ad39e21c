//! Complaint submission adapter

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolExecutionError;
use crate::services::{ComplaintCategory, ComplaintRecord, ComplaintService, ComplaintSubmission};
use crate::tool::{Tool, ToolResult, ToolType, cancellable, instrumented, preview};

/// Titles replaced by one derived from the description
const GENERIC_TITLES: &[&str] = &["problema", "issue", "error", "queja"];

/// Keyword sets in scoring order. Ties go to the earlier category.
const CATEGORY_KEYWORDS: &[(ComplaintCategory, &[&str])] = &[
    (
        ComplaintCategory::Academic,
        &[
            "califica", "nota", "examen", "profesor", "clase", "curso", "materia", "horario",
            "aula", "laboratorio",
        ],
    ),
    (
        ComplaintCategory::Administrative,
        &[
            "matricula", "inscripción", "registro", "documento", "certificado", "trámite", "pago",
            "beca", "admisión",
        ],
    ),
    (
        ComplaintCategory::Technology,
        &[
            "sistema", "plataforma", "internet", "wifi", "computadora", "aplicación", "página",
            "login", "contraseña",
        ],
    ),
    (
        ComplaintCategory::Infrastructure,
        &[
            "edificio", "aula", "baño", "biblioteca", "cafetería", "estacionamiento", "ascensor",
            "aire acondicionado",
        ],
    ),
    (
        ComplaintCategory::Services,
        &[
            "atención", "servicio", "personal", "secretaría", "ventanilla", "información", "ayuda",
        ],
    ),
    (
        ComplaintCategory::Financial,
        &[
            "pago", "dinero", "costo", "precio", "beca", "financiamiento", "cuota", "mensualidad",
        ],
    ),
];

/// Wraps a [`ComplaintService`] behind the uniform tool contract
pub struct ComplaintTool {
    service: Arc<dyn ComplaintService>,
}

impl ComplaintTool {
    pub fn new(service: Arc<dyn ComplaintService>) -> Self {
        Self { service }
    }

    /// Submit a complaint. Generic titles are regenerated from the
    /// description and a missing category is detected from its text.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_complaint(
        &self,
        title: &str,
        description: &str,
        user_id: Option<&str>,
        category: Option<ComplaintCategory>,
        is_anonymous: bool,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let params = json!({
            "title": preview(title, 50),
            "description_length": description.chars().count(),
            "is_anonymous": is_anonymous,
        });
        instrumented(
            self.name(),
            ToolType::Complaint,
            "submit_complaint",
            params,
            async {
                let submission = prepare_submission(
                    title,
                    description,
                    user_id,
                    category,
                    is_anonymous,
                    conversation_id,
                )?;

                tracing::info!(
                    title = %preview(&submission.title, 50),
                    category = submission.category.as_str(),
                    is_anonymous = submission.is_anonymous,
                    "Submitting complaint"
                );

                let title = submission.title.clone();
                let description_length = submission.description.chars().count();
                let record = cancellable(cancel, self.service.submit(submission))
                    .await?
                    .map_err(|e| {
                        ToolExecutionError::from_service("Complaint submission failed", &*e)
                            .with_detail("title", title.as_str())
                            .with_detail("description_length", description_length)
                    })?;

                tracing::info!(
                    complaint_id = %record.id,
                    category = record.category.as_str(),
                    "Complaint submitted successfully"
                );

                Ok(ToolResult::ok(ToolType::Complaint, record_data(&record), 1.0))
            },
        )
        .await
    }

    /// Submit straight from a chat message. Title and category are derived
    /// from the text; the complaint is anonymous when no user is known.
    pub async fn submit_quick_complaint(
        &self,
        user_message: &str,
        user_id: Option<&str>,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let message = user_message.trim();
        if message.is_empty() {
            return instrumented(
                self.name(),
                ToolType::Complaint,
                "submit_quick_complaint",
                json!({ "message_length": 0 }),
                async {
                    Err(ToolExecutionError::invalid_input("User message cannot be empty")
                        .with_detail("user_message", user_message))
                },
            )
            .await;
        }

        let title = generate_title(message);
        let category = detect_category(message);
        self.submit_complaint(
            &title,
            message,
            user_id,
            Some(category),
            user_id.is_none(),
            conversation_id,
            cancel,
        )
        .await
    }
}

fn prepare_submission(
    title: &str,
    description: &str,
    user_id: Option<&str>,
    category: Option<ComplaintCategory>,
    is_anonymous: bool,
    conversation_id: Option<&str>,
) -> Result<ComplaintSubmission, ToolExecutionError> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() {
        return Err(ToolExecutionError::invalid_input("Complaint title cannot be empty")
            .with_detail("title", title));
    }
    if description.is_empty() {
        return Err(
            ToolExecutionError::invalid_input("Complaint description cannot be empty")
                .with_detail("description", description),
        );
    }
    if !is_anonymous && user_id.is_none_or(|id| id.trim().is_empty()) {
        return Err(ToolExecutionError::invalid_input(
            "User ID is required for non-anonymous complaints",
        )
        .with_detail("is_anonymous", is_anonymous));
    }

    let title = if title.chars().count() < 5 || GENERIC_TITLES.contains(&title.to_lowercase().as_str())
    {
        generate_title(description)
    } else {
        title.to_string()
    };

    Ok(ComplaintSubmission {
        title,
        description: description.to_string(),
        category: category.unwrap_or_else(|| detect_category(description)),
        is_anonymous,
        user_id: if is_anonymous {
            None
        } else {
            user_id.map(str::to_string)
        },
        conversation_id: conversation_id.map(str::to_string),
    })
}

fn record_data(record: &ComplaintRecord) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("id".into(), Value::from(record.id.clone()));
    data.insert("short_id".into(), Value::from(record.short_id()));
    data.insert("title".into(), Value::from(record.title.clone()));
    data.insert("category".into(), json!(record.category));
    data.insert("priority".into(), json!(record.priority));
    data.insert("status".into(), json!(record.status));
    data.insert("is_anonymous".into(), Value::Bool(record.is_anonymous));
    data.insert("created_at".into(), Value::from(record.created_at.to_rfc3339()));
    data
}

/// Title for a complaint: the first sentence when it is between 6 and 100
/// characters, else the description itself, cut to 47 characters plus "..."
/// when longer than 50.
pub fn generate_title(description: &str) -> String {
    let first_sentence = description.split('.').next().unwrap_or("").trim();
    let len = first_sentence.chars().count();
    if len > 5 && len <= 100 {
        first_sentence.to_string()
    } else if description.chars().count() <= 50 {
        description.to_string()
    } else {
        format!("{}...", preview(description, 47))
    }
}

/// Keyword-scored category. Deterministic for a given text.
pub fn detect_category(text: &str) -> ComplaintCategory {
    let text = text.to_lowercase();
    let mut best = (ComplaintCategory::Other, 0);
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords.iter().filter(|k| text.contains(*k)).count();
        if score > best.1 {
            best = (*category, score);
        }
    }
    best.0
}

#[async_trait]
impl Tool for ComplaintTool {
    fn name(&self) -> &str {
        "ComplaintTool"
    }

    fn tool_type(&self) -> ToolType {
        ToolType::Complaint
    }

    async fn health_check(&self) -> bool {
        match self.service.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tool = self.name(), error = %e, "Tool health check failed");
                false
            }
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "tool_name": self.name(),
            "tool_type": ToolType::Complaint.as_str(),
            "operations": ["submit_complaint", "submit_quick_complaint"],
            "categories": CATEGORY_KEYWORDS
                .iter()
                .map(|(c, _)| c.as_str())
                .chain([ComplaintCategory::Other.as_str()])
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeComplaints;

    #[test]
    fn test_generate_title_first_sentence() {
        assert_eq!(
            generate_title("El wifi no funciona. Lleva dos días así."),
            "El wifi no funciona"
        );
    }

    #[test]
    fn test_generate_title_short_description() {
        assert_eq!(generate_title("wifi."), "wifi.");
    }

    #[test]
    fn test_generate_title_truncates_long_description() {
        let long = format!("{}.", "a".repeat(120));
        let title = generate_title(&long);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_detect_category() {
        assert_eq!(
            detect_category("El profesor no publicó la nota del examen"),
            ComplaintCategory::Academic
        );
        assert_eq!(
            detect_category("No puedo pagar la mensualidad, el costo subió"),
            ComplaintCategory::Financial
        );
        assert_eq!(detect_category("Algo raro pasa"), ComplaintCategory::Other);
    }

    #[test]
    fn test_detect_category_tie_goes_to_earlier_category() {
        // technology and infrastructure both score 1
        let text = "el wifi no funciona en la biblioteca";
        assert_eq!(detect_category(text), ComplaintCategory::Technology);
        for _ in 0..5 {
            assert_eq!(detect_category(text), ComplaintCategory::Technology);
        }
    }

    #[tokio::test]
    async fn test_submit_quick_complaint() {
        let fake = Arc::new(FakeComplaints::new());
        let tool = ComplaintTool::new(fake.clone());
        let r = tool
            .submit_quick_complaint(
                "el wifi no funciona en la biblioteca",
                None,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(r.success);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.data["category"], "technology");
        assert_eq!(r.data["is_anonymous"], true);
        assert_eq!(r.str_field("short_id").unwrap().chars().count(), 8);

        let submitted = fake.submissions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].title, "el wifi no funciona en la biblioteca");
        assert!(submitted[0].user_id.is_none());
    }

    #[tokio::test]
    async fn test_generic_title_is_regenerated() {
        let fake = Arc::new(FakeComplaints::new());
        let tool = ComplaintTool::new(fake.clone());
        let r = tool
            .submit_complaint(
                "Queja",
                "La cafetería cierra muy temprano. No hay dónde comer.",
                Some("u-1"),
                None,
                false,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(r.success);
        let submitted = fake.submissions();
        assert_eq!(submitted[0].title, "La cafetería cierra muy temprano");
        assert_eq!(submitted[0].category, ComplaintCategory::Infrastructure);
        assert_eq!(submitted[0].user_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let fake = Arc::new(FakeComplaints::new());
        let tool = ComplaintTool::new(fake.clone());
        let cancel = CancellationToken::new();

        let r = tool
            .submit_complaint("", "desc", None, None, true, None, &cancel)
            .await;
        assert_eq!(r.error_type, Some(ErrorKind::InvalidInput));

        let r = tool
            .submit_complaint("Titulo largo", "  ", None, None, true, None, &cancel)
            .await;
        assert_eq!(r.error_type, Some(ErrorKind::InvalidInput));

        let r = tool
            .submit_complaint("Titulo largo", "desc", None, None, false, None, &cancel)
            .await;
        assert_eq!(r.error_type, Some(ErrorKind::InvalidInput));

        let r = tool.submit_quick_complaint("   ", None, None, &cancel).await;
        assert_eq!(r.error_type, Some(ErrorKind::InvalidInput));

        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_service_failure_is_normalized() {
        let fake = Arc::new(FakeComplaints::failing("database unavailable"));
        let tool = ComplaintTool::new(fake);
        let r = tool
            .submit_quick_complaint("El ascensor está roto", None, None, &CancellationToken::new())
            .await;
        assert!(!r.success);
        assert_eq!(r.error_type, Some(ErrorKind::ServiceError));
        assert!(r.error_message.unwrap().contains("database unavailable"));
    }
}
