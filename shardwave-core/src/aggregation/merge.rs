//! Distributed aggregation merging (C4), §4.4.
//!
//! Partial aggregations are grouped by name across all successful shards,
//! then routed by the first entry's `type` tag to one of the merge
//! functions below. Every merge function here is commutative and
//! associative in the inputs' order, since shard responses arrive with
//! no ordering guarantee (§5).

use super::types::{AggregationPartial, AggregationResult, DateBucket, NumericBucket, RangeBucket, TermsBucket};
use crate::metrics::record_aggregation_merge_duration;
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

/// Merge one successful shard's worth of partial aggregations into the
/// accumulated groups, then dispatch. `shard_aggs` is one map per
/// successful shard; the caller (the executor) has already dropped
/// failed shards.
pub fn merge_aggregations(
    shard_aggs: &[HashMap<String, AggregationPartial>],
) -> HashMap<String, AggregationResult> {
    let mut grouped: HashMap<&str, Vec<&AggregationPartial>> = HashMap::new();
    for map in shard_aggs {
        for (name, partial) in map {
            grouped.entry(name.as_str()).or_default().push(partial);
        }
    }

    let mut out = HashMap::new();
    for (name, partials) in grouped {
        let Some(first) = partials.first() else { continue };
        let kind = first.kind();

        let uniform: Vec<&AggregationPartial> = partials
            .into_iter()
            .filter(|p| {
                if p.kind() == kind {
                    true
                } else {
                    warn!(
                        aggregation = name,
                        expected = kind,
                        found = p.kind(),
                        "dropping shard aggregation with mismatched type"
                    );
                    false
                }
            })
            .collect();
        if uniform.is_empty() {
            continue;
        }

        let start = Instant::now();
        match merge_one(kind, &uniform) {
            Some(result) => {
                record_aggregation_merge_duration(kind, start.elapsed());
                out.insert(name.to_string(), result);
            }
            None => warn!(aggregation = name, kind, "unknown aggregation tag, dropping"),
        }
    }
    out
}

fn merge_one(kind: &str, partials: &[&AggregationPartial]) -> Option<AggregationResult> {
    match kind {
        "terms" => Some(merge_terms(partials)),
        "histogram" => Some(merge_histogram(partials)),
        "date_histogram" => Some(merge_date_histogram(partials)),
        "range" => Some(merge_range(partials)),
        "filters" => Some(merge_filters(partials)),
        "stats" => Some(merge_stats(partials)),
        "extended_stats" => Some(merge_extended_stats(partials)),
        "avg" => Some(merge_avg(partials)),
        "min" => Some(merge_min(partials)),
        "max" => Some(merge_max(partials)),
        "sum" => Some(merge_sum(partials)),
        "value_count" => Some(merge_value_count(partials)),
        "percentiles" => Some(merge_percentiles(partials)),
        "cardinality" => Some(merge_cardinality(partials)),
        _ => None,
    }
}

fn merge_terms(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for p in partials {
        let AggregationPartial::Terms { buckets } = p else { unreachable!() };
        for b in buckets {
            counts
                .entry(b.key.clone())
                .and_modify(|c| *c += b.doc_count)
                .or_insert_with(|| {
                    order.push(b.key.clone());
                    b.doc_count
                });
        }
    }
    let mut buckets: Vec<TermsBucket> = order
        .into_iter()
        .map(|key| {
            let doc_count = counts[&key];
            TermsBucket { key, doc_count }
        })
        .collect();
    buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    AggregationResult::Terms { buckets }
}

fn merge_histogram(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut order: Vec<u64> = Vec::new();
    let mut counts: HashMap<u64, u64> = HashMap::new();
    for p in partials {
        let AggregationPartial::Histogram { buckets } = p else { unreachable!() };
        for b in buckets {
            let key_bits = b.key.to_bits();
            counts
                .entry(key_bits)
                .and_modify(|c| *c += b.doc_count)
                .or_insert_with(|| {
                    order.push(key_bits);
                    b.doc_count
                });
        }
    }
    let mut buckets: Vec<NumericBucket> = order
        .into_iter()
        .map(|bits| NumericBucket {
            key: f64::from_bits(bits),
            doc_count: counts[&bits],
        })
        .collect();
    buckets.sort_by(|a, b| a.key.partial_cmp(&b.key).unwrap_or(std::cmp::Ordering::Equal));
    AggregationResult::Histogram { buckets }
}

fn merge_date_histogram(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut order: Vec<i64> = Vec::new();
    let mut counts: HashMap<i64, u64> = HashMap::new();
    let mut labels: HashMap<i64, Option<String>> = HashMap::new();
    for p in partials {
        let AggregationPartial::DateHistogram { buckets } = p else { unreachable!() };
        for b in buckets {
            counts
                .entry(b.key)
                .and_modify(|c| *c += b.doc_count)
                .or_insert_with(|| {
                    order.push(b.key);
                    labels.insert(b.key, b.key_as_string.clone());
                    b.doc_count
                });
        }
    }
    order.sort_unstable();
    let buckets: Vec<DateBucket> = order
        .into_iter()
        .map(|key| DateBucket {
            key,
            key_as_string: labels.remove(&key).flatten(),
            doc_count: counts[&key],
        })
        .collect();
    AggregationResult::DateHistogram { buckets }
}

/// Range buckets keep the caller-declared order exactly; only `doc_count`
/// is summed across shards for matching keys.
fn merge_range(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut order: Vec<String> = Vec::new();
    let mut acc: HashMap<String, RangeBucket> = HashMap::new();
    for p in partials {
        let AggregationPartial::Range { buckets } = p else { unreachable!() };
        for b in buckets {
            match acc.get_mut(&b.key) {
                Some(existing) => existing.doc_count += b.doc_count,
                None => {
                    order.push(b.key.clone());
                    acc.insert(b.key.clone(), b.clone());
                }
            }
        }
    }
    let buckets = order.into_iter().map(|k| acc.remove(&k).unwrap()).collect();
    AggregationResult::Range { buckets }
}

/// Filters buckets merge as a named map-union; order is free by contract.
fn merge_filters(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut buckets: HashMap<String, u64> = HashMap::new();
    for p in partials {
        let AggregationPartial::Filters { buckets: shard_buckets } = p else { unreachable!() };
        for (name, count) in shard_buckets {
            *buckets.entry(name.clone()).or_insert(0) += count;
        }
    }
    AggregationResult::Filters { buckets }
}

fn merge_stats(partials: &[&AggregationPartial]) -> AggregationResult {
    let (count, min, max, sum) = fold_stats(partials);
    let avg = if count > 0 { sum / count as f64 } else { 0.0 };
    AggregationResult::Stats { count, min, max, sum, avg }
}

/// Folds the shared `count`/`min`/`max`/`sum` fields out of any partial
/// that carries them (`Stats` and `ExtendedStats` both do).
fn fold_stats(partials: &[&AggregationPartial]) -> (u64, f64, f64, f64) {
    let mut count = 0u64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for p in partials {
        let (c, mn, mx, s) = match p {
            AggregationPartial::Stats { count, min, max, sum } => (*count, *min, *max, *sum),
            AggregationPartial::ExtendedStats { count, min, max, sum, .. } => (*count, *min, *max, *sum),
            _ => unreachable!(),
        };
        if c == 0 {
            continue;
        }
        count += c;
        min = min.min(mn);
        max = max.max(mx);
        sum += s;
    }
    if count == 0 {
        (0, 0.0, 0.0, 0.0)
    } else {
        (count, min, max, sum)
    }
}

/// Global `variance` via the parallel-variance identity:
/// `variance = sum_of_squares/count - avg^2`, clamped to zero against
/// floating noise.
fn merge_extended_stats(partials: &[&AggregationPartial]) -> AggregationResult {
    let (count, min, max, sum) = fold_stats(partials);
    let sum_of_squares: f64 = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::ExtendedStats { sum_of_squares, .. } => *sum_of_squares,
            _ => unreachable!(),
        })
        .sum();

    let avg = if count > 0 { sum / count as f64 } else { 0.0 };
    let variance = if count > 0 {
        (sum_of_squares / count as f64 - avg * avg).max(0.0)
    } else {
        0.0
    };
    let std_deviation = variance.sqrt();

    AggregationResult::ExtendedStats {
        count,
        min,
        max,
        sum,
        avg,
        sum_of_squares,
        variance,
        std_deviation,
        std_deviation_bounds_upper: avg + 2.0 * std_deviation,
        std_deviation_bounds_lower: avg - 2.0 * std_deviation,
    }
}

/// Recomputed from re-derived `sum`/`count` across all shards.
fn merge_avg(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut sum = 0.0;
    let mut count = 0u64;
    for p in partials {
        let AggregationPartial::Avg { sum: s, count: c } = p else { unreachable!() };
        sum += s;
        count += c;
    }
    let value = if count > 0 { sum / count as f64 } else { 0.0 };
    AggregationResult::Avg { value }
}

fn merge_min(partials: &[&AggregationPartial]) -> AggregationResult {
    let value = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::Min { value } => *value,
            _ => unreachable!(),
        })
        .fold(f64::INFINITY, f64::min);
    AggregationResult::Min { value }
}

fn merge_max(partials: &[&AggregationPartial]) -> AggregationResult {
    let value = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::Max { value } => *value,
            _ => unreachable!(),
        })
        .fold(f64::NEG_INFINITY, f64::max);
    AggregationResult::Max { value }
}

fn merge_sum(partials: &[&AggregationPartial]) -> AggregationResult {
    let value = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::Sum { value } => *value,
            _ => unreachable!(),
        })
        .sum();
    AggregationResult::Sum { value }
}

fn merge_value_count(partials: &[&AggregationPartial]) -> AggregationResult {
    let value = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::ValueCount { value } => *value,
            _ => unreachable!(),
        })
        .sum();
    AggregationResult::ValueCount { value }
}

/// Approximate by design (§4.4, §9): the global value is the arithmetic
/// mean of the per-shard values for the same percentile key. An exact
/// merge needs a mergeable digest and is out of scope for this core.
fn merge_percentiles(partials: &[&AggregationPartial]) -> AggregationResult {
    let mut sums: HashMap<String, f64> = HashMap::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for p in partials {
        let AggregationPartial::Percentiles { values } = p else { unreachable!() };
        for (k, v) in values {
            *sums.entry(k.clone()).or_insert(0.0) += v;
            *counts.entry(k.clone()).or_insert(0) += 1;
        }
    }
    let values = sums
        .into_iter()
        .map(|(k, sum)| {
            let n = counts[&k] as f64;
            (k, sum / n)
        })
        .collect();
    AggregationResult::Percentiles { values }
}

/// Approximate by design: sums per-shard distinct counts, which
/// over-counts values present on multiple shards. An exact merge needs a
/// mergeable cardinality sketch and is out of scope for this core.
fn merge_cardinality(partials: &[&AggregationPartial]) -> AggregationResult {
    let value = partials
        .iter()
        .map(|p| match p {
            AggregationPartial::Cardinality { value } => *value,
            _ => unreachable!(),
        })
        .sum();
    AggregationResult::Cardinality { value }
}
