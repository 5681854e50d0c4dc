//! Aggregation-vs-semantic routing from question text alone.
//!
//! The keyword sets are domain tuning and live in [`KeywordSets`]; callers can
//! also swap the whole policy through [`QueryClassifier`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::aggregate::AggregateOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "op", rename_all = "snake_case")]
pub enum Intent {
    /// Answer from top-K retrieved context.
    Semantic,
    /// Answer with an exact statistic computed over the whole corpus.
    Aggregation(AggregateOp),
}

impl Intent {
    pub fn is_aggregation(&self) -> bool {
        matches!(self, Self::Aggregation(_))
    }

    pub fn op(&self) -> Option<AggregateOp> {
        match self {
            Self::Aggregation(op) => Some(*op),
            Self::Semantic => None,
        }
    }
}

/// Routing policy. Must be deterministic and never fail.
pub trait QueryClassifier: Send + Sync {
    fn classify(&self, question: &str) -> Intent;
}

/// One entry of the op priority list: fires when the question holds one of
/// `verbs` and one of `targets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpRule {
    pub op: AggregateOp,
    pub verbs: Vec<String>,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSets {
    /// Any of these marks a question as a candidate aggregation.
    pub aggregation_verbs: Vec<String>,
    /// ... provided it also names one of these entities.
    pub targets: Vec<String>,
    /// Checked in order; the first matching rule picks the op.
    pub op_rules: Vec<OpRule>,
    /// Op used when aggregation is detected but no rule matches.
    pub fallback_op: AggregateOp,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn rule(op: AggregateOp, verbs: &[&str], targets: &[String]) -> OpRule {
    OpRule {
        op,
        verbs: words(verbs),
        targets: targets.to_vec(),
    }
}

impl KeywordSets {
    /// Employee/salary vocabulary.
    pub fn employee_salary() -> Self {
        // Op rules only fire on these; pay/wage words still flag an aggregation.
        let values = words(&["salary", "salaries", "basic", "basicsalary"]);
        let loose_values = words(&["pay", "wage", "wages"]);
        let entities = words(&["employee", "employees"]);

        Self {
            aggregation_verbs: words(&[
                "total", "sum", "average", "avg", "mean", "count", "maximum", "max", "highest",
                "minimum", "min", "lowest", "median", "top",
            ]),
            targets: entities
                .iter()
                .chain(values.iter())
                .chain(loose_values.iter())
                .cloned()
                .collect(),
            op_rules: vec![
                rule(AggregateOp::Max, &["max", "maximum", "highest"], &values),
                rule(AggregateOp::Min, &["min", "minimum", "lowest"], &values),
                rule(AggregateOp::Total, &["total", "sum"], &values),
                rule(AggregateOp::Average, &["average", "avg", "mean"], &values),
                rule(AggregateOp::Count, &["count"], &entities),
            ],
            fallback_op: AggregateOp::FullStats,
        }
    }
}

impl Default for KeywordSets {
    fn default() -> Self {
        Self::employee_salary()
    }
}

/// Keyword classifier over lower-cased word tokens. Whole-token matching keeps
/// "summary" from reading as "sum" and "administration" as "min".
pub struct IntentClassifier {
    keywords: KeywordSets,
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self::with_keywords(KeywordSets::default())
    }

    pub fn with_keywords(keywords: KeywordSets) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &KeywordSets {
        &self.keywords
    }

    fn tokens(question: &str) -> HashSet<String> {
        question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn any_of(tokens: &HashSet<String>, list: &[String]) -> bool {
        list.iter().any(|w| tokens.contains(w.as_str()))
    }

    fn pick_op(&self, tokens: &HashSet<String>) -> AggregateOp {
        self.keywords
            .op_rules
            .iter()
            .find(|rule| Self::any_of(tokens, &rule.verbs) && Self::any_of(tokens, &rule.targets))
            .map(|rule| rule.op)
            .unwrap_or(self.keywords.fallback_op)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClassifier for IntentClassifier {
    fn classify(&self, question: &str) -> Intent {
        let tokens = Self::tokens(question);

        let is_aggregation = Self::any_of(&tokens, &self.keywords.aggregation_verbs)
            && Self::any_of(&tokens, &self.keywords.targets);
        if !is_aggregation {
            return Intent::Semantic;
        }

        Intent::Aggregation(self.pick_op(&tokens))
    }
}
