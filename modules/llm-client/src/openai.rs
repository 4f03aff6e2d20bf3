use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::types::{ChatRequest, ChatResponse, WireMessage};
use crate::{LlmClient, LlmError, Result};

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let started = std::time::Instant::now();

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completion returned"
        );

        let (content, finish_reason) = parsed.text();
        match content {
            Some(text) => Ok(text.trim().to_string()),
            None => Err(LlmError::Empty {
                finish_reason: finish_reason.to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .temperature(0.0);
        self.complete(&request).await
    }

    async fn chat_json(&self, system: &str, user: &str) -> Result<serde_json::Value> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .json_mode();
        let text = self.complete(&request).await?;
        serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_json_mode() {
        let request = ChatRequest::new("test-model")
            .message(WireMessage::system("sys"))
            .message(WireMessage::user("usr"))
            .json_mode();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "system");
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn response_text_skips_blank_content() {
        let raw = r#"{"choices": [{"message": {"content": "  "}, "finish_reason": "length"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let (content, finish_reason) = parsed.text();
        assert!(content.is_none());
        assert_eq!(finish_reason, "length");
    }
}
