use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::TextGenerator;
use crate::config::{GenerationConfig, TallyConfig};
use crate::http;
use crate::types::{ChatMessage, ChatRole};

/// Ollama `/api/chat` client, non-streaming.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    options: GenerationConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> String {
        self.message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default()
    }
}

impl OllamaGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        options: GenerationConfig,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = http::build_client(connect_timeout, timeout)?;

        tracing::info!(
            base_url = %base_url,
            model = %model,
            timeout_secs = timeout.as_secs(),
            "Creating OllamaGenerator"
        );

        Ok(Self {
            base_url,
            model,
            options,
            client,
        })
    }

    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        Self::new(
            config.services.ollama_url.clone(),
            config.services.gen_model.clone(),
            config.generation.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.generation_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if !messages.iter().any(|m| m.role == ChatRole::System) {
            wire.push(json!({"role": "system", "content": self.options.system_prompt}));
        }
        wire.extend(
            messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );

        json!({
            "model": self.model,
            "messages": wire,
            "stream": false,
            "options": {
                "temperature": self.options.temperature,
                "top_p": self.options.top_p,
                "num_predict": self.options.num_predict,
            }
        })
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            messages = messages.len(),
            "Sending Ollama chat request"
        );

        let started = std::time::Instant::now();
        let request = self.client.post(&endpoint).json(&self.request_body(messages));
        let response: ChatResponse = http::send_json(request, &endpoint).await?;
        let text = response.into_text();

        tracing::debug!(
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ollama chat response received"
        );
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.send(&[ChatMessage::user(prompt)]).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.send(messages).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
