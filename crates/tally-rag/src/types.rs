use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aggregate::AggregateOp;

/// Free-form attribute payload attached to a stored point.
pub type Payload = Map<String, Value>;

/// A stored point as returned by a full-collection scroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub payload: Payload,
}

impl Record {
    pub fn new(id: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// A single similarity-search result. Order of a hit list is the store's ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub record_id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
}

/// Opaque scroll position handed back by the store. Only ever round-tripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCursor(pub Value);

impl ScanCursor {
    /// Wrap a raw store token, returning `None` for tokens that signal end-of-scan.
    pub fn from_token(token: Option<Value>) -> Option<Self> {
        let token = token?;
        let exhausted = match &token {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        };
        if exhausted {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One page of a scroll: the records plus the cursor for the next request.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub next_cursor: Option<ScanCursor>,
}

/// The record that produced a min or max value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub record_id: String,
    pub dedup_key: Option<String>,
    pub name: String,
    pub value: f64,
}

/// Exact statistics over one full scan. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregateStats {
    pub entity_count: usize,
    pub values_found: usize,
    pub sum: f64,
    pub average: f64,
    pub min: Option<Exemplar>,
    pub max: Option<Exemplar>,
    /// True when at least one dedup key was observed during the scan.
    pub deduplicated: bool,
}

/// Statistics plus the bookkeeping of the scan that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub op: AggregateOp,
    pub stats: AggregateStats,
    pub records_scanned: usize,
    pub pages_fetched: usize,
    /// Set when a record budget stopped the scan before the store ran out of records.
    pub truncated: bool,
    pub collection_points_count: Option<u64>,
    pub computed_at: DateTime<Utc>,
}

/// Provenance of a context block used to build an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub record_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerFlow {
    FullScanMathThenRag,
    RagOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub top_k: Option<usize>,
    /// Optional record budget for a bounded-cost exploratory scan.
    pub max_records: Option<usize>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            max_records: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub math: Option<AggregateReport>,
    pub flow: AnswerFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
