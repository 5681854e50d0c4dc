use anyhow::Result;
use std::collections::HashSet;

use crate::extract::text_field;
use crate::storage::VectorStore;
use crate::types::Hit;

/// Top-K similarity search with near-duplicate removal.
pub struct HitRanker<'a> {
    store: &'a dyn VectorStore,
    collection: &'a str,
    text_field: &'a str,
    prefix_chars: usize,
}

impl<'a> HitRanker<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        collection: &'a str,
        text_field: &'a str,
        prefix_chars: usize,
    ) -> Self {
        Self {
            store,
            collection,
            text_field,
            prefix_chars: prefix_chars.max(1),
        }
    }

    /// Similarity search; the store's ranking is kept as-is.
    pub async fn rank(&self, query_vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.store.search(self.collection, query_vector, k).await
    }

    /// Drop hits whose display text repeats an earlier hit's leading characters.
    pub fn dedupe(&self, hits: Vec<Hit>) -> Vec<Hit> {
        dedupe_hits(hits, self.text_field, self.prefix_chars)
    }

    pub async fn rank_deduped(&self, query_vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        let hits = self.rank(query_vector, k).await?;
        let total = hits.len();
        let kept = self.dedupe(hits);
        tracing::debug!(
            collection = %self.collection,
            k,
            returned = total,
            kept = kept.len(),
            "Ranked hits"
        );
        Ok(kept)
    }
}

/// Keep first-seen order. Re-ingested rows produce identical text, so the first
/// `prefix_chars` characters of the trimmed text act as the identity. Hits with
/// no text are dropped since they cannot serve as context.
pub fn dedupe_hits(hits: Vec<Hit>, field: &str, prefix_chars: usize) -> Vec<Hit> {
    let mut seen: HashSet<String> = HashSet::new();
    hits.into_iter()
        .filter(|hit| {
            let key: String = text_field(&hit.payload, field)
                .trim()
                .chars()
                .take(prefix_chars)
                .collect();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}
