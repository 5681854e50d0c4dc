use std::fmt;

use thiserror::Error;

/// Remote collaborator that a request depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    VectorStore,
    Generation,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Embedding => "embedding service",
            Service::VectorStore => "vector store",
            Service::Generation => "generation service",
        };
        f.write_str(name)
    }
}

/// Request-level failure surfaced to callers of the engine.
///
/// Malformed individual records never produce one of these; they are
/// dropped from the aggregate instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any upstream call was made.
    #[error("{0}")]
    Validation(String),

    /// An upstream call failed or timed out. Not retried.
    #[error("Upstream request failed: {service}: {source:#}")]
    Upstream {
        service: Service,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(service: Service, source: anyhow::Error) -> Self {
        Self::Upstream { service, source }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}
