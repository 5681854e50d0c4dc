//! Exact, deduplicated statistics over a full scan.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::extract::RecordExtractor;
use crate::types::{AggregateStats, Exemplar, Record};

/// Which statistic an aggregation query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOp {
    Total,
    Average,
    Count,
    Max,
    Min,
    FullStats,
}

impl AggregateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Average => "average",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
            Self::FullStats => "full_stats",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateOp {
    type Err = String;

    /// Accepts short names and the legacy endpoint names (`avg_salary`, `count_employees`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "total" | "sum" | "total_salary" => Ok(Self::Total),
            "average" | "avg" | "mean" | "avg_salary" => Ok(Self::Average),
            "count" | "count_employees" => Ok(Self::Count),
            "max" | "maximum" | "max_salary" => Ok(Self::Max),
            "min" | "minimum" | "min_salary" => Ok(Self::Min),
            "" | "stats" | "full_stats" | "salary_stats" => Ok(Self::FullStats),
            other => Err(format!("unknown aggregate op '{}'", other)),
        }
    }
}

/// Turns a record stream into [`AggregateStats`] through a [`RecordExtractor`].
pub struct AggregationEngine<'a> {
    extractor: &'a dyn RecordExtractor,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(extractor: &'a dyn RecordExtractor) -> Self {
        Self { extractor }
    }

    pub fn compute<'r, I>(&self, records: I) -> AggregateStats
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let mut acc = self.accumulator();
        for record in records {
            acc.push(record);
        }
        acc.finish()
    }

    /// Incremental form of [`compute`](Self::compute), fed page by page during a scan.
    pub fn accumulator(&self) -> Accumulator<'a> {
        Accumulator {
            extractor: self.extractor,
            seen: HashSet::new(),
            sum: 0.0,
            values_found: 0,
            skipped_duplicates: 0,
            min: None,
            max: None,
        }
    }
}

/// Running state for one aggregation. Owned by a single request.
pub struct Accumulator<'a> {
    extractor: &'a dyn RecordExtractor,
    seen: HashSet<String>,
    sum: f64,
    values_found: usize,
    skipped_duplicates: usize,
    min: Option<Exemplar>,
    max: Option<Exemplar>,
}

impl Accumulator<'_> {
    pub fn push(&mut self, record: &Record) {
        let key = self.extractor.dedup_key(&record.payload);
        if let Some(ref k) = key {
            // A key is claimed by its first record even when that record has no
            // value, so a later valued duplicate is still dropped.
            if !self.seen.insert(k.clone()) {
                self.skipped_duplicates += 1;
                return;
            }
        }

        let Some(value) = self.extractor.numeric_value(&record.payload) else {
            return;
        };

        self.sum += value;
        self.values_found += 1;

        let beats_min = self.min.as_ref().map_or(true, |m| value < m.value);
        let beats_max = self.max.as_ref().map_or(true, |m| value > m.value);
        if !(beats_min || beats_max) {
            return;
        }

        let exemplar = Exemplar {
            record_id: record.id.clone(),
            dedup_key: key,
            name: self.extractor.display_name(&record.payload),
            value,
        };
        if beats_min {
            self.min = Some(exemplar.clone());
        }
        if beats_max {
            self.max = Some(exemplar);
        }
    }

    pub fn finish(self) -> AggregateStats {
        let deduplicated = !self.seen.is_empty();
        let entity_count = if deduplicated {
            self.seen.len()
        } else {
            self.values_found
        };
        let average = if entity_count > 0 {
            self.sum / entity_count as f64
        } else {
            0.0
        };

        tracing::debug!(
            entity_count,
            values_found = self.values_found,
            skipped_duplicates = self.skipped_duplicates,
            deduplicated,
            "Aggregation finished"
        );

        AggregateStats {
            entity_count,
            values_found: self.values_found,
            sum: self.sum,
            average,
            min: self.min,
            max: self.max,
            deduplicated,
        }
    }
}
