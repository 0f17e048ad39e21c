//! Adapters around the engine's external collaborators

mod complaint;
mod document;
mod llm;

pub use complaint::{ComplaintTool, detect_category, generate_title};
pub use document::{DocumentTool, MAX_SEARCH_LIMIT, distinct_sources};
pub use llm::{
    FALLBACK_CONFIDENCE, IntentClassification, LlmTool, keyword_intent,
    parse_classification_response, persona_prompt,
};
