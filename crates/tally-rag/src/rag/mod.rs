//! Query routing and answer assembly.

pub mod intent;
pub mod synthesizer;

pub use intent::{Intent, IntentClassifier, KeywordSets, OpRule, QueryClassifier};
pub use synthesizer::{
    aggregation_prompt, build_context, format_number, render_statement, semantic_prompt,
    AnswerSynthesizer, ContextBlock, Synthesis,
};
