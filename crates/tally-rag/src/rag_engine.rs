use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::{AggregateOp, AggregationEngine};
use crate::config::TallyConfig;
use crate::embeddings::{EmbeddingModel, OllamaEmbeddings};
use crate::error::{PipelineError, Service};
use crate::extract::{ExtractionProfile, RecordExtractor};
use crate::llm::{OllamaGenerator, TextGenerator};
use crate::rag::{AnswerSynthesizer, Intent, IntentClassifier, KeywordSets, QueryClassifier};
use crate::search::HitRanker;
use crate::storage::{CorpusScanner, QdrantStore, VectorStore};
use crate::types::{
    AggregateReport, AnswerFlow, AskRequest, AskResponse, ChatMessage, ChatRole, Hit,
};

/// Request pipeline: classify, then either retrieve-and-generate or run an exact
/// full-scan aggregation alongside retrieval and let the generator explain it.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct RagEngine {
    config: TallyConfig,
    embeddings: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn TextGenerator>,
    classifier: Arc<dyn QueryClassifier>,
    extractor: Arc<dyn RecordExtractor>,
    synthesizer: AnswerSynthesizer,
}

impl RagEngine {
    /// Engine wired to Ollama and Qdrant as described by `config`.
    pub fn new(config: TallyConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

        let embeddings = OllamaEmbeddings::from_config(&config)
            .context("Failed to build embedding client")?;
        let store = QdrantStore::from_config(&config).context("Failed to build Qdrant client")?;
        let generator =
            OllamaGenerator::from_config(&config).context("Failed to build generation client")?;

        tracing::info!(
            ollama = %config.services.ollama_url,
            qdrant = %config.services.qdrant_url,
            collection = %config.services.collection,
            embed_model = %config.services.embed_model,
            gen_model = %config.services.gen_model,
            "RAG engine initialized"
        );

        Ok(Self::with_components(
            config,
            Arc::new(embeddings),
            Arc::new(store),
            Arc::new(generator),
        ))
    }

    /// Engine over caller-supplied collaborators.
    pub fn with_components(
        config: TallyConfig,
        embeddings: Arc<dyn EmbeddingModel>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let extractor = ExtractionProfile {
            text_field: config.search.text_field.clone(),
            ..ExtractionProfile::employee_salary()
        };
        let synthesizer = AnswerSynthesizer::new(
            generator.clone(),
            config.labels.clone(),
            config.search.text_field.clone(),
            config.search.not_found_reply.clone(),
        );

        Self {
            config,
            embeddings,
            store,
            generator,
            classifier: Arc::new(IntentClassifier::new()),
            extractor: Arc::new(extractor),
            synthesizer,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_keywords(self, keywords: KeywordSets) -> Self {
        self.with_classifier(Arc::new(IntentClassifier::with_keywords(keywords)))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn RecordExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    fn collection(&self) -> &str {
        &self.config.services.collection
    }

    /// Parse an op name as accepted by the math operation.
    pub fn parse_op(name: &str) -> Result<AggregateOp, PipelineError> {
        name.parse::<AggregateOp>().map_err(PipelineError::validation)
    }

    /// Answer a natural-language question.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, PipelineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::validation("question is required"));
        }
        let max_records = request.max_records;
        check_budget(max_records)?;
        let top_k = request
            .top_k
            .filter(|k| *k > 0)
            .unwrap_or(self.config.search.default_top_k);

        let span = tracing::info_span!("ask", request_id = %Uuid::new_v4());
        async move {
            let started = Instant::now();
            let intent = self.classifier.classify(question);
            tracing::info!(intent = ?intent, top_k, "Question classified");

            let (report, hits) = match intent {
                Intent::Aggregation(op) => {
                    let (report, hits) = tokio::try_join!(
                        self.aggregate(op, max_records),
                        self.retrieve(question, top_k)
                    )?;
                    (Some(report), hits)
                }
                Intent::Semantic => (None, self.retrieve(question, top_k).await?),
            };

            let synthesis = self
                .synthesizer
                .synthesize(question, intent, report.as_ref().map(|r| &r.stats), &hits, top_k)
                .await
                .map_err(|e| PipelineError::upstream(Service::Generation, e))?;

            let flow = if report.is_some() {
                AnswerFlow::FullScanMathThenRag
            } else {
                AnswerFlow::RagOnly
            };
            tracing::info!(
                flow = ?flow,
                sources = synthesis.sources.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Question answered"
            );

            Ok(AskResponse {
                answer: synthesis.answer,
                sources: synthesis.sources,
                math: report,
                flow,
            })
        }
        .instrument(span)
        .await
    }

    /// Exact statistic over the collection, no classification and no generation.
    pub async fn math(
        &self,
        op: AggregateOp,
        max_records: Option<usize>,
    ) -> Result<AggregateReport, PipelineError> {
        check_budget(max_records)?;
        let span = tracing::info_span!("math", request_id = %Uuid::new_v4(), op = %op);
        self.aggregate(op, max_records).instrument(span).await
    }

    /// LLM-only conversation turn; the vector store is not consulted.
    pub async fn chat(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String, PipelineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PipelineError::validation("message is required"));
        }

        let messages = chat_messages(
            &self.config.chat.preamble,
            history,
            self.config.chat.history_turns,
            message,
        );
        tracing::debug!(
            model = %self.generator.model(),
            history = history.len(),
            sent = messages.len(),
            "Chat turn"
        );

        self.generator
            .chat(&messages)
            .await
            .map_err(|e| PipelineError::upstream(Service::Generation, e))
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
        let vector = self
            .embeddings
            .embed_query(question)
            .await
            .map_err(|e| PipelineError::upstream(Service::Embedding, e))?;

        HitRanker::new(
            self.store.as_ref(),
            self.collection(),
            &self.config.search.text_field,
            self.config.search.dedupe_prefix_chars,
        )
        .rank_deduped(&vector, top_k)
        .await
        .map_err(|e| PipelineError::upstream(Service::VectorStore, e))
    }

    async fn aggregate(
        &self,
        op: AggregateOp,
        max_records: Option<usize>,
    ) -> Result<AggregateReport, PipelineError> {
        let collection = self.collection();
        let started = Instant::now();

        let engine = AggregationEngine::new(self.extractor.as_ref());
        let mut acc = engine.accumulator();
        let progress = CorpusScanner::new(self.store.as_ref(), self.config.scan.batch_size)
            .scan_pages(collection, max_records, |page| {
                for record in &page {
                    acc.push(record);
                }
            })
            .await
            .map_err(|e| PipelineError::upstream(Service::VectorStore, e))?;
        let stats = acc.finish();

        let collection_points_count = match self.store.count(collection).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Point count unavailable");
                None
            }
        };

        tracing::info!(
            op = %op,
            collection = %collection,
            records = progress.records,
            pages = progress.pages_fetched,
            entity_count = stats.entity_count,
            truncated = progress.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation computed"
        );

        Ok(AggregateReport {
            op,
            stats,
            records_scanned: progress.records,
            pages_fetched: progress.pages_fetched,
            truncated: progress.truncated,
            collection_points_count,
            computed_at: chrono::Utc::now(),
        })
    }
}

fn check_budget(max_records: Option<usize>) -> Result<(), PipelineError> {
    if max_records == Some(0) {
        return Err(PipelineError::validation("max_records must be > 0"));
    }
    Ok(())
}

/// Preamble as the system message, then the last `turns` non-empty
/// user/assistant turns, then the new message.
fn chat_messages(
    preamble: &str,
    history: &[ChatMessage],
    turns: usize,
    message: &str,
) -> Vec<ChatMessage> {
    let usable: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != ChatRole::System && !m.content.trim().is_empty())
        .collect();
    let window = &usable[usable.len().saturating_sub(turns)..];

    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(ChatMessage::system(preamble.trim()));
    messages.extend(window.iter().map(|m| (*m).clone()));
    messages.push(ChatMessage::user(message));
    messages
}
