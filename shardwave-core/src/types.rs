//! Core data types: shard routing, node identity, per-shard responses and
//! the merged result shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable primary key for a data node, minted by the cluster-state authority.
pub type NodeId = String;

/// Non-negative shard identifier in `[0, N)` for an index with N shards.
pub type ShardId = u32;

/// Opaque, parser-produced query payload. The core neither interprets nor
/// mutates it; it is handed straight to the per-node RPC.
pub type QueryBlob = bytes::Bytes;

/// Opaque, parser-produced filter payload, same treatment as [`QueryBlob`].
pub type FilterBlob = bytes::Bytes;

/// Lifecycle state of one shard allocation, as published by the authority.
///
/// Only `Started` is eligible for query dispatch (see `ShardAllocation::is_eligible`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    /// No node owns this shard yet.
    Unallocated,
    /// A node owns it but has not finished readying it for queries.
    Initializing,
    /// The owning node has announced readiness to answer queries.
    Started,
}

/// One entry of the authority's per-index shard-allocation map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAllocation {
    pub node_id: NodeId,
    pub state: ShardState,
}

impl ShardAllocation {
    /// Eligible for dispatch: `Started` with a non-empty node-id.
    pub fn is_eligible(&self) -> bool {
        self.state == ShardState::Started && !self.node_id.is_empty()
    }
}

/// The authority's complete shard-allocation map for one index.
pub type ShardRouting = HashMap<ShardId, ShardAllocation>;

/// An entry of the authority's node directory, as returned by `list-nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: NodeId,
    /// Dialable address, e.g. `"10.0.4.12:9443"` or `"data-node-7:9443"`.
    pub address: String,
}

/// One ranked result within a shard's (or the merged) hit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub doc_id: String,
    pub score: f64,
    /// Opaque document payload; the core never looks inside it.
    pub source: HashMap<String, serde_json::Value>,
}

/// A data node's response to one shard `search` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardSearchResponse {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
    pub max_score: f64,
    pub aggregations: HashMap<String, crate::aggregation::AggregationPartial>,
}

/// A data node's response to one shard `count` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShardCountResponse {
    pub count: u64,
}

/// Per-request shard accounting, surfaced for observability and optionally
/// attached to the merged result as a `_shards` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

/// The globally-merged search result returned to the REST layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub took_ms: u64,
    pub total_hits: u64,
    pub max_score: f64,
    pub hits: Vec<Hit>,
    pub aggregations: HashMap<String, crate::aggregation::AggregationResult>,
    pub shards: ShardStats,
}
