//! Observability metrics for the distributed query execution core
//!
//! Emits the time series named in the design's external-interfaces section.
//! This module only records; a host process wires a `metrics`-compatible
//! recorder (e.g. `metrics-exporter-prometheus`) before these calls do
//! anything observable.

use std::time::{Duration, Instant};

/// End-to-end executor latency for one `execute-search`/`execute-count` call.
pub fn record_search_latency(index: &str, duration: Duration) {
    metrics::histogram!(
        "distributed_search_latency_seconds",
        "index" => index.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Total hits returned by one merged search.
pub fn record_hits_total(index: &str, hits: u64) {
    metrics::histogram!(
        "distributed_search_hits_total",
        "index" => index.to_string(),
    )
    .record(hits as f64);
}

/// Number of shards a search actually queried (eligible and dispatched).
pub fn record_shards_queried(index: &str, shards: u32) {
    metrics::histogram!(
        "distributed_search_shards_queried",
        "index" => index.to_string(),
    )
    .record(shards as f64);
}

/// Per-shard RPC duration.
pub fn record_shard_query_duration(index: &str, shard_id: u32, node_id: &str, duration: Duration) {
    metrics::histogram!(
        "shard_query_latency_seconds",
        "index" => index.to_string(),
        "shard_id" => shard_id.to_string(),
        "node_id" => node_id.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Per-shard RPC failure, labeled with the error kind that caused it.
pub fn record_shard_query_failure(index: &str, shard_id: u32, node_id: &str, error_kind: &str) {
    metrics::counter!(
        "shard_query_failures_total",
        "index" => index.to_string(),
        "shard_id" => shard_id.to_string(),
        "node_id" => node_id.to_string(),
        "error_kind" => error_kind.to_string(),
    )
    .increment(1);
}

/// Time spent merging one aggregation kind across shards.
pub fn record_aggregation_merge_duration(aggregation_type: &str, duration: Duration) {
    metrics::histogram!(
        "aggregation_merge_seconds",
        "aggregation_type" => aggregation_type.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Size of the data-node client pool, sampled after register/unregister.
pub fn record_pool_size(size: usize) {
    metrics::gauge!("data_node_pool_size").set(size as f64);
}

/// Consuming guard that times one per-shard RPC call and records duration
/// plus success/failure on drop-by-consumption, mirroring the donor
/// codebase's `RpcTimer` pattern.
pub struct ShardQueryTimer {
    index: String,
    shard_id: u32,
    node_id: String,
    start: Instant,
}

impl ShardQueryTimer {
    pub fn new(index: &str, shard_id: u32, node_id: &str) -> Self {
        Self {
            index: index.to_string(),
            shard_id,
            node_id: node_id.to_string(),
            start: Instant::now(),
        }
    }

    pub fn success(self) {
        record_shard_query_duration(&self.index, self.shard_id, &self.node_id, self.start.elapsed());
    }

    pub fn error(self, error_kind: &str) {
        record_shard_query_duration(&self.index, self.shard_id, &self.node_id, self.start.elapsed());
        record_shard_query_failure(&self.index, self.shard_id, &self.node_id, error_kind);
    }
}
