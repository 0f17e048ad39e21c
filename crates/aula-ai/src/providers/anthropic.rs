//! Anthropic Messages API provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LanguageModel;
use crate::error::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: impl Into<String>, model: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_request(&self, prompt: &str, max_tokens: u32, temperature: f32) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens,
            temperature,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicProvider {
    async fn generate_text(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = self.build_request(prompt, max_tokens, temperature);
        let url = format!("{}/v1/messages", self.base_url);

        tracing::debug!(url = %url, model = %self.model, "Anthropic messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
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
            return Err(match serde_json::from_str::<AnthropicErrorEnvelope>(&text) {
                Ok(envelope) => Error::api(envelope.error.error_type, envelope.error.message),
                Err(_) => Error::api(format!("http_{}", status.as_u16()), text),
            });
        }

        let body: AnthropicResponse = response.json().await?;
        extract_text(body)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

fn extract_text(body: AnthropicResponse) -> Result<String> {
    let text = body
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptyResponse);
    }
    Ok(text.to_string())
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let provider = AnthropicProvider::new("key", "claude-3-5-haiku-latest", "https://api.anthropic.com");
        let json = serde_json::to_value(provider.build_request("hola", 200, 0.7)).unwrap();
        assert_eq!(json["model"], "claude-3-5-haiku-latest");
        assert_eq!(json["max_tokens"], 200);
        assert_eq!(json["messages"][0]["content"], "hola");
    }

    #[test]
    fn test_extract_text_joins_text_blocks() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Hola, "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "¿qué tal?"}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "Hola, ¿qué tal?");
    }

    #[test]
    fn test_extract_text_empty() {
        let body: AnthropicResponse =
            serde_json::from_value(serde_json::json!({"content": []})).unwrap();
        assert!(matches!(extract_text(body), Err(Error::EmptyResponse)));
    }
}
