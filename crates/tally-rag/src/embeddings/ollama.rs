use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::EmbeddingModel;
use crate::config::TallyConfig;
use crate::http;

/// Ollama `/api/embeddings` client.
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

impl OllamaEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
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
            "Creating OllamaEmbeddings"
        );

        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        Self::new(
            config.services.ollama_url.clone(),
            config.services.embed_model.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.embed_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddings {
    async fn embed_with_model(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %model,
            text_len = text.len(),
            "Requesting embedding"
        );

        let request = self
            .client
            .post(&endpoint)
            .json(&json!({ "model": model, "prompt": text }));
        let response: EmbeddingResponse = http::send_json(request, &endpoint).await?;

        match response.embedding {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(anyhow!(
                "Ollama embeddings response from {} is missing 'embedding'",
                endpoint
            )),
        }
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
