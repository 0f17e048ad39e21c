//! Text-generation provider implementations

pub mod anthropic;
pub mod openai;

use crate::{Error, Provider, ProviderConfig, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for text-generation providers
///
/// Implementations must be safe to call concurrently from independent
/// conversation turns.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate_text(&self, prompt: &str, max_tokens: u32, temperature: f32)
    -> Result<String>;

    /// Stable provider identifier (e.g. "openai")
    fn provider_name(&self) -> &str;
}

/// Get an API key from the provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}

/// Build a provider client from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider {
        Provider::OpenAI => {
            let key = get_api_key(config.api_key.as_deref(), "OPENAI_API_KEY")?;
            Ok(Arc::new(openai::OpenAIProvider::new(
                key,
                &config.model,
                &config.base_url,
            )))
        }
        Provider::Anthropic => {
            let key = get_api_key(config.api_key.as_deref(), "ANTHROPIC_API_KEY")?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(
                key,
                &config.model,
                &config.base_url,
            )))
        }
        Provider::Ollama | Provider::Custom => {
            if config.base_url.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "{} provider requires a base_url",
                    config.provider.name()
                )));
            }
            // OpenAI-compatible servers; the key is optional.
            let key = config.api_key.clone().unwrap_or_default();
            Ok(Arc::new(
                openai::OpenAIProvider::new(key, &config.model, &config.base_url)
                    .with_name(config.provider.name()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_prefers_provided() {
        let key = get_api_key(Some("sk-test"), "AULA_TEST_UNSET_VAR").unwrap();
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn test_get_api_key_missing() {
        let err = get_api_key(None, "AULA_TEST_DEFINITELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }

    #[test]
    fn test_create_custom_requires_base_url() {
        let config = ProviderConfig {
            provider: Provider::Custom,
            model: "local".into(),
            base_url: String::new(),
            api_key: None,
        };
        assert!(matches!(
            create_provider(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_create_ollama_uses_compatible_client() {
        let config = ProviderConfig::for_provider(Provider::Ollama);
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
    }
}
