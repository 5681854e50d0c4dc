//! Final answer assembly.
//!
//! For aggregation questions the computed statement is authoritative: it is
//! placed verbatim at the head of the answer and the generator only adds an
//! explanation after it.

use anyhow::Result;
use std::sync::Arc;

use crate::aggregate::AggregateOp;
use crate::config::StatementLabels;
use crate::extract::text_field;
use crate::llm::TextGenerator;
use crate::rag::intent::Intent;
use crate::types::{AggregateStats, Exemplar, Hit, Source};

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Numbered context blocks plus the sources they came from.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub text: String,
    pub sources: Vec<Source>,
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
    labels: StatementLabels,
    text_field: String,
    not_found_reply: String,
}

impl AnswerSynthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        labels: StatementLabels,
        text_field: impl Into<String>,
        not_found_reply: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            labels,
            text_field: text_field.into(),
            not_found_reply: not_found_reply.into(),
        }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        intent: Intent,
        stats: Option<&AggregateStats>,
        hits: &[Hit],
        top_k: usize,
    ) -> Result<Synthesis> {
        let context = build_context(hits, &self.text_field);

        match (intent, stats) {
            (Intent::Aggregation(op), Some(stats)) => {
                let statement = render_statement(op, stats, &self.labels);
                let prompt = aggregation_prompt(&statement, &context.text, question);
                let narrative = self.generator.generate(&prompt).await?;

                Ok(Synthesis {
                    answer: format!(
                        "{}\n\nExplanation/examples (Top-{}):\n{}",
                        statement, top_k, narrative
                    ),
                    sources: context.sources,
                })
            }
            (intent, _) => {
                if intent.is_aggregation() {
                    tracing::warn!("Aggregation intent without stats, answering from context only");
                }
                let prompt = semantic_prompt(&context.text, question, &self.not_found_reply);
                let answer = self.generator.generate(&prompt).await?;
                Ok(Synthesis {
                    answer,
                    sources: context.sources,
                })
            }
        }
    }
}

/// `[i] text` blocks separated by blank lines. Numbering follows hit order.
pub fn build_context(hits: &[Hit], field: &str) -> ContextBlock {
    let mut blocks = Vec::with_capacity(hits.len());
    let mut sources = Vec::with_capacity(hits.len());

    for (i, hit) in hits.iter().enumerate() {
        let text = text_field(&hit.payload, field).trim();
        if text.is_empty() {
            continue;
        }
        blocks.push(format!("[{}] {}", i + 1, text));
        sources.push(Source {
            record_id: hit.record_id.clone(),
            score: hit.score,
        });
    }

    ContextBlock {
        text: blocks.join("\n\n"),
        sources,
    }
}

/// Deterministic one-line statement for `op`.
pub fn render_statement(
    op: AggregateOp,
    stats: &AggregateStats,
    labels: &StatementLabels,
) -> String {
    match op {
        AggregateOp::Total => format!(
            "Total {} (ALL {}) = {}",
            labels.value,
            labels.entities,
            format_number(stats.sum)
        ),
        AggregateOp::Average => format!(
            "Average {} (ALL {}) = {}",
            labels.value,
            labels.entities,
            format_number(stats.average)
        ),
        AggregateOp::Count => format!("{} count = {}", labels.entity, stats.entity_count),
        AggregateOp::Max => format!(
            "Max {} = {}",
            labels.value,
            exemplar_text(stats.max.as_ref(), labels)
        ),
        AggregateOp::Min => format!(
            "Min {} = {}",
            labels.value,
            exemplar_text(stats.min.as_ref(), labels)
        ),
        AggregateOp::FullStats => format!(
            "{}={}, Total={}, Avg={}, Min={}, Max={}",
            capitalize(&labels.entities),
            stats.entity_count,
            format_number(stats.sum),
            format_number(stats.average),
            optional_number(stats.min.as_ref()),
            optional_number(stats.max.as_ref()),
        ),
    }
}

fn exemplar_text(exemplar: Option<&Exemplar>, labels: &StatementLabels) -> String {
    match exemplar {
        Some(e) => format!(
            "{} ({}: {} | ID: {})",
            format_number(e.value),
            labels.entity,
            e.name,
            e.dedup_key.as_deref().unwrap_or("")
        ),
        None => "none".to_string(),
    }
}

fn optional_number(exemplar: Option<&Exemplar>) -> String {
    exemplar
        .map(|e| format_number(e.value))
        .unwrap_or_else(|| "none".to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Integral values keep one decimal place (`4000.0`), others print in full.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

pub fn aggregation_prompt(statement: &str, context: &str, question: &str) -> String {
    format!(
        "NUMERIC_RESULT (authoritative):\n\
         {statement}\n\
         \n\
         Rules:\n\
         - DO NOT recompute numbers (sum/avg/min/max/count) from CONTEXT.\n\
         - The NUMERIC_RESULT above is final; do not restate it with different numbers.\n\
         - Use CONTEXT only for explanation and a few examples.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION:\n\
         {question}\n\
         \n\
         Answer:"
    )
}

pub fn semantic_prompt(context: &str, question: &str, not_found_reply: &str) -> String {
    format!(
        "You answer ONLY from CONTEXT.\n\
         If the answer is not in CONTEXT, say: {not_found_reply}\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION:\n\
         {question}\n\
         \n\
         Answer:"
    )
}
