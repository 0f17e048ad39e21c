//! Configuration file support

use aula_ai::{Provider, ProviderConfig};
use aula_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for aula
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Provider (openai, anthropic, ollama, custom)
    pub provider: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Base URL override, required for ollama and custom servers
    pub base_url: Option<String>,
    /// JSON document corpus served by the local document service
    pub corpus: Option<String>,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
    /// Engine settings
    pub engine: EngineConfig,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

impl CliConfig {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aula")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("AULA_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = CliConfig {
            provider: Some("openai".to_string()),
            model: Some(Provider::OpenAI.default_model().to_string()),
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }

    /// API key for a provider from the config file. The provider layer
    /// falls back to the environment when this is `None`.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::OpenAI => self.api_keys.openai.clone(),
            Provider::Anthropic => self.api_keys.anthropic.clone(),
            Provider::Ollama | Provider::Custom => None,
        }
    }

    /// Merge file settings with command-line overrides (CLI wins)
    pub fn provider_config(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> anyhow::Result<ProviderConfig> {
        let name = provider
            .or(self.provider.as_deref())
            .unwrap_or("openai");
        let provider = Provider::parse(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {}", name))?;

        let mut config = ProviderConfig::for_provider(provider);
        if let Some(model) = model.or(self.model.as_deref()) {
            config.model = model.to_string();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config.api_key = self.api_key(provider);
        Ok(config)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# aula configuration file
# Place at ~/.config/aula/config.toml (Linux) or set AULA_CONFIG_PATH

# Provider (openai, anthropic, ollama, custom)
provider = "openai"

# Model identifier
model = "gpt-4o-mini"

# Base URL (required for ollama and custom OpenAI-compatible servers)
# base_url = "http://localhost:11434/v1"

# Document corpus for the local document service: a JSON array of
# {"filename": "...", "content": "..."} objects
# corpus = "~/.config/aula/corpus.json"

# API keys (optional - can also use environment variables)
[api_keys]
# openai = "sk-..."
# anthropic = "sk-ant-..."

[engine]
institution = "Universidad del Pacífico"
language = "español"
search_limit = 3
similarity_threshold = 0.7
history_window = 3
llm_cache_size = 100
# graph or sequential
execution_mode = "graph"

[engine.classification]
max_tokens = 50
temperature = 0.1

[engine.synthesis]
max_tokens = 300
temperature = 0.0

[engine.chat]
max_tokens = 200
temperature = 0.7
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use aula_engine::ExecutionMode;

    #[test]
    fn test_example_config_parses() {
        let config = CliConfig::parse(example_config()).unwrap();
        assert_eq!(config.provider.as_deref(), Some("openai"));
        assert_eq!(config.engine.execution_mode, ExecutionMode::Graph);
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = CliConfig {
            provider: Some("anthropic".into()),
            model: Some("claude-3-5-haiku-latest".into()),
            ..Default::default()
        };
        let merged = config.provider_config(Some("openai"), None).unwrap();
        assert_eq!(merged.provider, Provider::OpenAI);
        assert_eq!(merged.model, "claude-3-5-haiku-latest");

        assert!(config.provider_config(Some("nope"), None).is_err());
    }

    #[test]
    fn test_api_key_from_file() {
        let config = CliConfig::parse("[api_keys]\nopenai = \"sk-test\"").unwrap();
        assert_eq!(config.api_key(Provider::OpenAI).as_deref(), Some("sk-test"));
        assert_eq!(config.api_key(Provider::Anthropic), None);
    }
}
