//! Wire contracts for the core's two consumed RPCs.
//!
//! Both services are collaborators (§1): the cluster-state authority and
//! the per-node local search engine own the server side. The core only
//! ever plays the tarpc client role against these traits.

use crate::error::ClusterError;
use crate::types::{
    FilterBlob, NodeDescriptor, QueryBlob, ShardCountResponse, ShardId, ShardRouting, ShardSearchResponse,
};

/// The cluster-state authority (C1), §4.1 and §6.
#[tarpc::service]
pub trait ClusterStateService {
    /// `{shard-id -> {node-id, state}}` for one index, or `NOT_FOUND` /
    /// `AUTHORITY_UNAVAILABLE`.
    async fn get_shard_routing(index: String) -> Result<ShardRouting, ClusterError>;

    /// The authority's current `{node-id -> address}` directory, used by
    /// the discovery loop to learn dialable addresses.
    async fn list_nodes() -> Result<Vec<NodeDescriptor>, ClusterError>;
}

/// The per-node local search engine (consumed by C2's clients), §4.2 and §6.
#[tarpc::service]
pub trait DataNodeService {
    async fn search(
        index: String,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
    ) -> Result<ShardSearchResponse, ClusterError>;

    async fn count(
        index: String,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
    ) -> Result<ShardCountResponse, ClusterError>;
}
