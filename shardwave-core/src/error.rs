//! Error taxonomy for the distributed query execution core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the cluster-state client (C1), the data-node pool
/// (C2), the executor (C3), and the aggregator (C4).
///
/// Variants map onto the error kinds named in the design; `error_type()`
/// gives each a stable string used as the `error_kind` metrics label.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ClusterError {
    /// C1 could not be reached (transport failure talking to the authority).
    #[error("cluster-state authority unavailable: {0}")]
    AuthorityUnavailable(String),

    /// C1 reported the index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// C1 failed for any reason; wraps the whole `execute-search`/`execute-count` call.
    #[error("shard routing unavailable: {0}")]
    RoutingUnavailable(String),

    /// Per-shard: no client registered for the allocation's node-id.
    #[error("no client registered for node {0}")]
    ClientNotFound(String),

    /// Per-shard: dial/connect to the data node failed.
    #[error("connection to node {0} failed: {1}")]
    ConnectionFailed(String, String),

    /// Per-shard: the data-node RPC itself returned an error.
    #[error("shard search failed: {0}")]
    ShardSearchFailed(String),

    /// Per-shard or whole-call: the caller's deadline elapsed.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Whole-call: every eligible shard failed. Wraps the first shard's error.
    #[error("all shards failed, first error: {0}")]
    AllShardsFailed(Box<ClusterError>),

    /// Transport/TLS/serialization setup failure. Not part of the
    /// request-scoped taxonomy but needed to report construction-time errors.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClusterError {
    /// Stable discriminant used as the `error_kind` metrics label.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClusterError::AuthorityUnavailable(_) => "authority_unavailable",
            ClusterError::IndexNotFound(_) => "index_not_found",
            ClusterError::RoutingUnavailable(_) => "routing_unavailable",
            ClusterError::ClientNotFound(_) => "client_not_found",
            ClusterError::ConnectionFailed(_, _) => "connection_failed",
            ClusterError::ShardSearchFailed(_) => "shard_search_failed",
            ClusterError::DeadlineExceeded(_) => "deadline_exceeded",
            ClusterError::AllShardsFailed(_) => "all_shards_failed",
            ClusterError::Transport(_) => "transport",
        }
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(err: std::io::Error) -> Self {
        ClusterError::Transport(err.to_string())
    }
}

impl From<std::net::AddrParseError> for ClusterError {
    fn from(err: std::net::AddrParseError) -> Self {
        ClusterError::Transport(err.to_string())
    }
}

impl From<bincode::Error> for ClusterError {
    fn from(err: bincode::Error) -> Self {
        ClusterError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
