pub mod aggregate;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extract;
pub(crate) mod http;
pub mod llm;
pub mod rag;
pub mod rag_engine;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use aggregate::{AggregateOp, AggregationEngine};
pub use config::TallyConfig;
pub use error::{PipelineError, Service};
pub use extract::{ExtractionProfile, FieldSpec, RecordExtractor};
pub use rag::{Intent, IntentClassifier, KeywordSets, QueryClassifier};
pub use rag_engine::RagEngine;
pub use types::{
    AggregateReport, AggregateStats, AnswerFlow, AskRequest, AskResponse, ChatMessage, ChatRole,
    Hit, Record, Source,
};

// Re-export common types
pub use anyhow::{Error, Result};
