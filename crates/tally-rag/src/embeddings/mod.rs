pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

pub use ollama::OllamaEmbeddings;

/// Remote embedding model: `(model, text) -> vector`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed `text` with an explicitly named model.
    async fn embed_with_model(&self, model: &str, text: &str) -> Result<Vec<f32>>;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Embed a search query with the default model.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.default_model().to_string();
        self.embed_with_model(&model, text).await
    }
}
