//! OpenAI Chat Completions API provider
//!
//! Also used for OpenAI-compatible servers (Ollama, vLLM, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LanguageModel;
use crate::error::{Error, Result};

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: impl Into<String>, model: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            name: "openai".to_string(),
        }
    }

    /// Override the reported provider name (for compatible servers)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn build_request(&self, prompt: &str, max_tokens: u32, temperature: f32) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
            stream: false,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIProvider {
    async fn generate_text(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = self.build_request(prompt, max_tokens, temperature);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(url = %url, model = %self.model, "OpenAI completion request");

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Error::RateLimited { retry_after });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let body: OpenAIResponse = response.json().await?;
        extract_text(body)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

fn parse_error_body(status: u16, text: &str) -> Error {
    match serde_json::from_str::<OpenAIErrorEnvelope>(text) {
        Ok(envelope) => Error::api(
            envelope
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status)),
            envelope.error.message,
        ),
        Err(_) => Error::api(format!("http_{}", status), text),
    }
}

fn extract_text(body: OpenAIResponse) -> Result<String> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("no choices in completion".to_string()))?;

    let text = choice.message.content.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptyResponse);
    }
    Ok(text.to_string())
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}
