//! The fourteen aggregation kinds, modeled as tagged variants.
//!
//! Two distinct enums exist deliberately: [`AggregationPartial`] is what a
//! shard emits (carries whatever each kind needs to merge exactly, e.g.
//! `avg` carries `sum`/`count` rather than a single value), and
//! [`AggregationResult`] is what the merger emits (the user-facing shape,
//! e.g. `avg` collapses to a single `value`). Keeping them separate stops
//! the per-shard wire shape from leaking into the merger's internals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One bucket of a `terms` aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsBucket {
    pub key: String,
    pub doc_count: u64,
}

/// One bucket of a `histogram` aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericBucket {
    pub key: f64,
    pub doc_count: u64,
}

/// One bucket of a `date_histogram` aggregation. `key` is the bucket's
/// start instant as epoch milliseconds, the numeric form the key is
/// ordered on; `key_as_string` is the caller-supplied formatted label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub key: i64,
    pub key_as_string: Option<String>,
    pub doc_count: u64,
}

/// One bucket of a `range` aggregation. Order is caller-declared and is
/// never re-sorted by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBucket {
    pub key: String,
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub doc_count: u64,
}

/// Per-shard aggregation output, tagged by kind. The tag is identical
/// across shards for a given aggregation name by contract; the merge
/// router dispatches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationPartial {
    Terms { buckets: Vec<TermsBucket> },
    Histogram { buckets: Vec<NumericBucket> },
    DateHistogram { buckets: Vec<DateBucket> },
    Range { buckets: Vec<RangeBucket> },
    Filters { buckets: HashMap<String, u64> },
    Stats { count: u64, min: f64, max: f64, sum: f64 },
    ExtendedStats { count: u64, min: f64, max: f64, sum: f64, sum_of_squares: f64 },
    /// Carries `sum`/`count` rather than a precomputed average.
    Avg { sum: f64, count: u64 },
    Min { value: f64 },
    Max { value: f64 },
    Sum { value: f64 },
    ValueCount { value: u64 },
    /// Percentile-string (e.g. `"95.0"`) to value.
    Percentiles { values: HashMap<String, f64> },
    Cardinality { value: u64 },
}

impl AggregationPartial {
    /// The wire tag, used to detect a mismatched type across shards for the
    /// same aggregation name.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationPartial::Terms { .. } => "terms",
            AggregationPartial::Histogram { .. } => "histogram",
            AggregationPartial::DateHistogram { .. } => "date_histogram",
            AggregationPartial::Range { .. } => "range",
            AggregationPartial::Filters { .. } => "filters",
            AggregationPartial::Stats { .. } => "stats",
            AggregationPartial::ExtendedStats { .. } => "extended_stats",
            AggregationPartial::Avg { .. } => "avg",
            AggregationPartial::Min { .. } => "min",
            AggregationPartial::Max { .. } => "max",
            AggregationPartial::Sum { .. } => "sum",
            AggregationPartial::ValueCount { .. } => "value_count",
            AggregationPartial::Percentiles { .. } => "percentiles",
            AggregationPartial::Cardinality { .. } => "cardinality",
        }
    }
}

/// The globally-merged aggregation result, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationResult {
    Terms { buckets: Vec<TermsBucket> },
    Histogram { buckets: Vec<NumericBucket> },
    DateHistogram { buckets: Vec<DateBucket> },
    Range { buckets: Vec<RangeBucket> },
    Filters { buckets: HashMap<String, u64> },
    Stats { count: u64, min: f64, max: f64, sum: f64, avg: f64 },
    ExtendedStats {
        count: u64,
        min: f64,
        max: f64,
        sum: f64,
        avg: f64,
        sum_of_squares: f64,
        variance: f64,
        std_deviation: f64,
        std_deviation_bounds_upper: f64,
        std_deviation_bounds_lower: f64,
    },
    Avg { value: f64 },
    Min { value: f64 },
    Max { value: f64 },
    Sum { value: f64 },
    ValueCount { value: u64 },
    Percentiles { values: HashMap<String, f64> },
    Cardinality { value: u64 },
}

impl AggregationResult {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationResult::Terms { .. } => "terms",
            AggregationResult::Histogram { .. } => "histogram",
            AggregationResult::DateHistogram { .. } => "date_histogram",
            AggregationResult::Range { .. } => "range",
            AggregationResult::Filters { .. } => "filters",
            AggregationResult::Stats { .. } => "stats",
            AggregationResult::ExtendedStats { .. } => "extended_stats",
            AggregationResult::Avg { .. } => "avg",
            AggregationResult::Min { .. } => "min",
            AggregationResult::Max { .. } => "max",
            AggregationResult::Sum { .. } => "sum",
            AggregationResult::ValueCount { .. } => "value_count",
            AggregationResult::Percentiles { .. } => "percentiles",
            AggregationResult::Cardinality { .. } => "cardinality",
        }
    }
}
