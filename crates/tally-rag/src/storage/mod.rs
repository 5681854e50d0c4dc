pub mod qdrant;
pub mod scanner;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Hit, ScanCursor, ScanPage};

pub use qdrant::QdrantStore;
pub use scanner::{CorpusScanner, ScanOutcome};

/// Remote vector store holding `(id, vector, payload)` points in named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Similarity search. Hits come back in the store's ranking order.
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<Hit>>;

    /// Fetch one page of a full-collection scroll.
    async fn scroll(
        &self,
        collection: &str,
        batch_size: usize,
        cursor: Option<&ScanCursor>,
    ) -> Result<ScanPage>;

    /// Number of points the store reports for the collection, if it reports one.
    async fn count(&self, collection: &str) -> Result<Option<u64>>;
}
