//! shardwave-core: the distributed query execution core of a sharded,
//! OpenSearch-compatible search cluster.
//!
//! This crate sits between a REST front-end and a set of per-node local
//! search engines. It does not index documents, does not decide shard
//! placement, and does not compute scores from raw postings; those are
//! owned by collaborators outside this crate. What it does own:
//!
//! - **Shard routing** ([`routing`]): a thin, side-effect-free client for
//!   the cluster-state authority (C1).
//! - **Data-node client pool** ([`pool`]): one RPC client per known data
//!   node, plus continuous background discovery ([`discovery`]) that
//!   keeps the pool in sync with the authority's node directory (C2).
//! - **Query executor** ([`executor`]): scatter/gather dispatch across
//!   shards with per-shard failure accounting and partial-result
//!   semantics (C3).
//! - **Result aggregator** ([`aggregation`]): merges hits and all
//!   fourteen aggregation kinds into one globally-correct response (C4).
//!
//! [`coordinator::Coordinator`] wires C1 through C4 together the way a
//! coordinating node does in the source cluster.

pub mod aggregation;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod pool;
pub mod rpc;
pub mod routing;
pub mod transport;
pub mod types;

pub use aggregation::{AggregationPartial, AggregationResult};
pub use config::{CoreConfig, DiscoveryConfig, ExecutorConfig, TlsConfig};
pub use coordinator::Coordinator;
pub use discovery::{ClientFactory, DiscoveryLoop};
pub use error::{ClusterError, Result};
pub use executor::QueryExecutor;
pub use pool::{DataNodeClient, DataNodePool, QuicDataNodeClient};
pub use routing::{ClusterStateClient, QuicClusterStateClient};
pub use types::*;
