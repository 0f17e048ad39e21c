//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Which workflow implementation runs a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Nodes wired as a directed graph with conditional edges
    #[default]
    Graph,
    /// Plain step-by-step execution
    Sequential,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Graph => "graph",
            ExecutionMode::Sequential => "sequential",
        }
    }
}

/// Sampling parameters for one kind of model call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Configuration for the conversation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Institution the assistant speaks for
    pub institution: String,
    /// Language replies are written in
    pub language: String,
    /// Number of chunks requested from document search
    pub search_limit: usize,
    /// Minimum chunk similarity accepted by document search
    pub similarity_threshold: f32,
    /// Prior turns included in the classification prompt
    pub history_window: usize,
    /// Entry cap for the model response cache
    pub llm_cache_size: usize,
    pub execution_mode: ExecutionMode,
    pub classification: Sampling,
    pub synthesis: Sampling,
    pub chat: Sampling,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            institution: "Universidad del Pacífico".to_string(),
            language: "español".to_string(),
            search_limit: 3,
            similarity_threshold: 0.7,
            history_window: 3,
            llm_cache_size: 100,
            execution_mode: ExecutionMode::default(),
            classification: Sampling {
                max_tokens: 50,
                temperature: 0.1,
            },
            synthesis: Sampling {
                max_tokens: 300,
                temperature: 0.0,
            },
            chat: Sampling {
                max_tokens: 200,
                temperature: 0.7,
            },
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.institution.trim().is_empty() {
            return Err(Error::Config("institution must not be empty".into()));
        }
        if !(1..=50).contains(&self.search_limit) {
            return Err(Error::Config(format!(
                "search_limit must be between 1 and 50, got {}",
                self.search_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity_threshold must be between 0.0 and 1.0, got {}",
                self.similarity_threshold
            )));
        }
        for (name, sampling) in [
            ("classification", &self.classification),
            ("synthesis", &self.synthesis),
            ("chat", &self.chat),
        ] {
            if !(1..=1000).contains(&sampling.max_tokens) {
                return Err(Error::Config(format!(
                    "{}.max_tokens must be between 1 and 1000",
                    name
                )));
            }
            if !(0.0..=1.0).contains(&sampling.temperature) {
                return Err(Error::Config(format!(
                    "{}.temperature must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        Ok(())
    }
}
