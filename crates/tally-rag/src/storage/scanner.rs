//! Exhaustive cursor-paginated retrieval of a collection.
//!
//! Pages are requested strictly one after another: the cursor for page N+1 is
//! only known once page N has arrived.

use anyhow::Result;

use super::VectorStore;
use crate::types::{Record, ScanCursor};

/// Bookkeeping for a finished scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: Vec<Record>,
    pub pages_fetched: usize,
    /// True when a record budget ended the scan before the store ran out of records.
    pub truncated: bool,
}

/// Counters returned by [`CorpusScanner::scan_pages`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub records: usize,
    pub pages_fetched: usize,
    pub truncated: bool,
}

pub struct CorpusScanner<'a> {
    store: &'a dyn VectorStore,
    batch_size: usize,
}

impl<'a> CorpusScanner<'a> {
    pub fn new(store: &'a dyn VectorStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Every record in the collection.
    pub async fn scan_all(&self, collection: &str) -> Result<ScanOutcome> {
        self.collect(collection, None).await
    }

    /// At most `max_records` records, for bounded-cost exploratory queries.
    pub async fn scan_capped(&self, collection: &str, max_records: usize) -> Result<ScanOutcome> {
        self.collect(collection, Some(max_records)).await
    }

    async fn collect(&self, collection: &str, max_records: Option<usize>) -> Result<ScanOutcome> {
        let mut records = Vec::new();
        let progress = self
            .scan_pages(collection, max_records, |page| records.extend(page))
            .await?;

        Ok(ScanOutcome {
            records,
            pages_fetched: progress.pages_fetched,
            truncated: progress.truncated,
        })
    }

    /// Stream the collection page by page into `on_page`.
    ///
    /// Stops when the store hands back no cursor, or an empty page (some stores
    /// return a stale cursor alongside zero records), or the budget is spent.
    pub async fn scan_pages<F>(
        &self,
        collection: &str,
        max_records: Option<usize>,
        mut on_page: F,
    ) -> Result<ScanProgress>
    where
        F: FnMut(Vec<Record>),
    {
        let mut progress = ScanProgress::default();
        let mut cursor: Option<ScanCursor> = None;

        loop {
            let limit = match max_records {
                Some(max) => {
                    let remaining = max.saturating_sub(progress.records);
                    if remaining == 0 {
                        progress.truncated |= progress.pages_fetched == 0 || cursor.is_some();
                        break;
                    }
                    remaining.min(self.batch_size)
                }
                None => self.batch_size,
            };

            let page = self.store.scroll(collection, limit, cursor.as_ref()).await?;
            progress.pages_fetched += 1;

            let mut records = page.records;
            // Stores may overfill a page; only a record budget may cut one short.
            if let Some(max) = max_records {
                let remaining = max.saturating_sub(progress.records);
                if records.len() > remaining {
                    records.truncate(remaining);
                    progress.truncated = true;
                }
            }
            let page_len = records.len();
            progress.records += page_len;

            tracing::debug!(
                collection = %collection,
                page = progress.pages_fetched,
                page_len,
                total = progress.records,
                "Scanned page"
            );

            if page_len > 0 {
                on_page(records);
            }

            cursor = page.next_cursor;
            if cursor.is_none() || page_len == 0 {
                break;
            }
        }

        tracing::info!(
            collection = %collection,
            records = progress.records,
            pages = progress.pages_fetched,
            truncated = progress.truncated,
            "Scan finished"
        );
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{employee, MemoryStore};
    use serde_json::json;
    use std::collections::HashSet;

    fn corpus(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| employee(&i.to_string(), json!(1000 + i)))
            .collect()
    }

    #[tokio::test]
    async fn test_scan_returns_every_record_once() {
        let store = MemoryStore::new(corpus(23));
        let outcome = CorpusScanner::new(&store, 5).scan_all("c").await.unwrap();

        assert_eq!(outcome.records.len(), 23);
        let ids: HashSet<_> = outcome.records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 23);
        assert!(outcome.pages_fetched <= 5);
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_size() {
        let store = MemoryStore::new(corpus(20));
        let outcome = CorpusScanner::new(&store, 5).scan_all("c").await.unwrap();
        assert_eq!(outcome.records.len(), 20);
        assert_eq!(outcome.pages_fetched, 4);
        assert_eq!(store.scroll_calls(), 4);
    }

    #[tokio::test]
    async fn test_empty_collection_takes_one_fetch() {
        let store = MemoryStore::new(Vec::new());
        let outcome = CorpusScanner::new(&store, 200).scan_all("c").await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_stale_cursor_with_empty_page_terminates() {
        let store = MemoryStore::new(corpus(3)).with_stale_cursor();
        let outcome = CorpusScanner::new(&store, 2).scan_all("c").await.unwrap();
        assert_eq!(outcome.records.len(), 3);
        // two real pages, then one empty page carrying a cursor
        assert_eq!(outcome.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_capped_scan_stops_at_budget() {
        let store = MemoryStore::new(corpus(50));
        let outcome = CorpusScanner::new(&store, 20).scan_capped("c", 30).await.unwrap();
        assert_eq!(outcome.records.len(), 30);
        assert_eq!(outcome.pages_fetched, 2);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_capped_scan_larger_than_corpus() {
        let store = MemoryStore::new(corpus(7));
        let outcome = CorpusScanner::new(&store, 5).scan_capped("c", 100).await.unwrap();
        assert_eq!(outcome.records.len(), 7);
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_overfilled_pages_are_kept_whole() {
        let store = MemoryStore::new(corpus(6)).with_page_size(3);
        let outcome = CorpusScanner::new(&store, 2).scan_all("c").await.unwrap();

        assert_eq!(outcome.records.len(), 6);
        let ids: HashSet<_> = outcome.records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(outcome.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_overfilled_pages_still_respect_budget() {
        let store = MemoryStore::new(corpus(6)).with_page_size(3);
        let outcome = CorpusScanner::new(&store, 2).scan_capped("c", 4).await.unwrap();

        assert_eq!(outcome.records.len(), 4);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn test_scroll_failure_propagates() {
        let store = MemoryStore::new(corpus(10)).failing_scroll();
        let err = CorpusScanner::new(&store, 5).scan_all("c").await.unwrap_err();
        assert!(err.to_string().contains("scroll"));
    }
}
