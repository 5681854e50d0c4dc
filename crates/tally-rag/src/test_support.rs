//! In-memory collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::embeddings::EmbeddingModel;
use crate::llm::{render_transcript, TextGenerator};
use crate::storage::VectorStore;
use crate::types::{ChatMessage, Hit, Payload, Record, ScanCursor, ScanPage};

pub(crate) fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {}", other),
    }
}

/// Record keyed by `EMPLOYEEID` with a structured `BASICSALARY`.
pub(crate) fn employee(id: &str, salary: Value) -> Record {
    Record::new(
        format!("pt-{}", id),
        payload(json!({ "EMPLOYEEID": id, "BASICSALARY": salary })),
    )
}

pub(crate) fn hit(id: &str, score: f32, prompt: &str) -> Hit {
    Hit {
        record_id: id.to_string(),
        score,
        payload: payload(json!({ "prompt": prompt })),
    }
}

/// Vector store over a fixed record list. Cursors are record offsets.
pub(crate) struct MemoryStore {
    records: Vec<Record>,
    hits: Vec<Hit>,
    page_size: Option<usize>,
    stale_cursor: bool,
    fail_scroll: bool,
    fail_search: bool,
    scroll_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            hits: Vec::new(),
            page_size: None,
            stale_cursor: false,
            fail_scroll: false,
            fail_search: false,
            scroll_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_hits(mut self, hits: Vec<Hit>) -> Self {
        self.hits = hits;
        self
    }

    /// Serve pages of `size` records whatever batch size is requested.
    pub(crate) fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Keep handing out a cursor after the last record.
    pub(crate) fn with_stale_cursor(mut self) -> Self {
        self.stale_cursor = true;
        self
    }

    pub(crate) fn failing_scroll(mut self) -> Self {
        self.fail_scroll = true;
        self
    }

    pub(crate) fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub(crate) fn scroll_calls(&self) -> usize {
        self.scroll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn search(&self, _collection: &str, _vector: &[f32], limit: usize) -> Result<Vec<Hit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(anyhow!("search unavailable"));
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn scroll(
        &self,
        _collection: &str,
        batch_size: usize,
        cursor: Option<&ScanCursor>,
    ) -> Result<ScanPage> {
        self.scroll_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_scroll {
            return Err(anyhow!("scroll unavailable"));
        }

        let start = cursor
            .and_then(|c| c.as_value().as_u64())
            .map(|n| n as usize)
            .unwrap_or(0)
            .min(self.records.len());
        let end = (start + self.page_size.unwrap_or(batch_size)).min(self.records.len());

        let next_cursor = if end < self.records.len() || self.stale_cursor {
            Some(ScanCursor(json!(end)))
        } else {
            None
        };

        Ok(ScanPage {
            records: self.records[start..end].to_vec(),
            next_cursor,
        })
    }

    async fn count(&self, _collection: &str) -> Result<Option<u64>> {
        Ok(Some(self.records.len() as u64))
    }
}

pub(crate) struct FixedEmbeddings {
    fail: bool,
}

impl FixedEmbeddings {
    pub(crate) fn new() -> Self {
        Self { fail: false }
    }

    pub(crate) fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl EmbeddingModel for FixedEmbeddings {
    async fn embed_with_model(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(anyhow!("embedding timed out"));
        }
        Ok(vec![text.len() as f32, 1.0, 0.0])
    }

    fn default_model(&self) -> &str {
        "fixed"
    }
}

/// Generator that returns a canned reply and records every prompt and chat it saw.
pub(crate) struct ScriptedGenerator {
    reply: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
    chats: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            prompts: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn chats(&self) -> Vec<Vec<ChatMessage>> {
        self.chats.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(anyhow!("generation failed"));
        }
        Ok(self.reply.clone())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.chats.lock().unwrap().push(messages.to_vec());
        self.generate(&render_transcript(messages)).await
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
