//! aula-ai: Text-generation provider abstraction layer
//!
//! This crate provides a common interface for prompting language models
//! from different vendors (OpenAI, Anthropic, and OpenAI-compatible servers).

pub mod error;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use providers::{LanguageModel, create_provider};
pub use types::*;
