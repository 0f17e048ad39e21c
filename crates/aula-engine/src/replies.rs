//! Fixed user-facing texts.

/// Shown when document search or grounded synthesis finds nothing.
pub const NO_INFORMATION: &str = "No encontré información específica sobre eso en los documentos oficiales.";

pub const NO_INFORMATION_GUIDANCE: &str = "¿Podrías ser más específico o usar palabras clave diferentes? También puedo ayudarte con:
• Procedimientos académicos
• Fechas límite importantes
• Reglamentos de la universidad";

pub const ANSWER_PREFIX: &str = "Según los documentos oficiales:";

pub const SOURCE_LABEL: &str = "📄 Fuente:";

pub const COMPLAINT_FAILED: &str = "Lo siento, no pude registrar tu reporte en este momento.

Por favor intenta de nuevo en unos minutos, o contacta directamente con la administración si es urgente.";

/// Generic apology used for any pipeline-level failure.
pub const APOLOGY: &str = "Lo siento, tuve un problema procesando tu mensaje. ¿Puedes intentar de nuevo?";

/// Used when a turn ends without any reply text.
pub const UNPROCESSED: &str = "Lo siento, no pude procesar tu mensaje.";

pub const THANKS_REPLY: &str = "¡De nada! Me alegra haber podido ayudarte.

Si tienes más preguntas o necesitas ayuda con algún procedimiento, no dudes en preguntar.";

pub const GREETING_WORDS: &[&str] = &["hola", "buenos", "buenas", "saludos", "hey"];

pub const THANKS_WORDS: &[&str] = &["gracias", "thank"];

pub mod actions {
    pub const MORE_DETAILS: &str = "¿Necesitas más detalles sobre este tema?";
    pub const ANYTHING_ELSE: &str = "¿Hay algo más en lo que pueda ayudarte?";
    pub const REFINE_KEYWORDS: &str = "Intenta con palabras clave más específicas";
    pub const ASK_SPECIFIC: &str = "Pregunta sobre un tema específico";
    pub const REPORT_PROBLEM: &str = "Reporta un problema";
    pub const REPORT_ANOTHER: &str = "¿Quieres reportar otro problema?";
    pub const RETRY_REPORT: &str = "Intenta reportar de nuevo";
    pub const ASK_PROCEDURES: &str = "Pregunta sobre procedimientos";
    pub const SEARCH_DOCUMENTS: &str = "Buscar en documentos oficiales";
    pub const REPHRASE: &str = "Intenta reformular tu pregunta";
    pub const CONTACT_SUPPORT: &str = "Contacta soporte si el problema persiste";
}

/// Confirmation for a stored complaint.
pub fn complaint_confirmation(short_id: &str) -> String {
    format!(
        "✅ He registrado tu reporte exitosamente.

📋 ID del reporte: #{short_id}

Tu reporte será revisado por el equipo administrativo. Puedes hacer seguimiento con este ID."
    )
}

pub fn greeting(institution: &str) -> String {
    format!(
        "¡Hola! Soy el asistente virtual de {institution}.

Puedo ayudarte con:
• Información sobre procedimientos académicos
• Búsqueda en documentos oficiales
• Registro de reportes o problemas

¿En qué puedo ayudarte hoy?"
    )
}

/// Acknowledgment echoing a truncated copy of the message.
pub fn acknowledgment(institution: &str, message: &str) -> String {
    let preview: String = message.chars().take(50).collect();
    let ellipsis = if message.chars().count() > 50 { "..." } else { "" };
    format!(
        "Vi tu mensaje: \"{preview}{ellipsis}\"

Soy el asistente de {institution}. ¿En qué puedo ayudarte específicamente?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgment_truncates() {
        let long = "a".repeat(80);
        let text = acknowledgment("UP", &long);
        assert!(text.contains(&format!("\"{}...\"", "a".repeat(50))));

        let text = acknowledgment("UP", "corto");
        assert!(text.contains("\"corto\""));
    }

    #[test]
    fn test_confirmation_embeds_id() {
        assert!(complaint_confirmation("ab12cd34").contains("#ab12cd34"));
    }
}
