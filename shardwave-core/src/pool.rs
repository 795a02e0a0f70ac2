//! Data-node client pool (C2), §4.2.
//!
//! Owns one RPC client per known data node. The pool itself is a thin
//! reader/writer-locked map; the hot path (`lookup`) takes only a read
//! lock. Re-registering a node-id atomically replaces the previous
//! client; its in-flight calls keep running on their own `Arc`.

use crate::config::TlsConfig;
use crate::error::{ClusterError, Result};
use crate::metrics::record_pool_size;
use crate::rpc::DataNodeServiceClient;
use crate::transport::{make_client_endpoint, resolve_addr, QuicBiStream};
use crate::types::{FilterBlob, NodeId, QueryBlob, ShardCountResponse, ShardId, ShardSearchResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tarpc::client::Config as TarpcConfig;
use tarpc::context;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::{debug, warn};

/// Per-node RPC contract consumed by the executor, §4.2.
///
/// Implementations are thread-safe: concurrent `search` calls for
/// different shards against the same client are legal and expected.
#[async_trait]
pub trait DataNodeClient: Send + Sync {
    fn node_id(&self) -> &str;

    /// Whether the underlying transport currently believes it has a live
    /// connection. Best-effort: a connection can die between this check
    /// and the next RPC.
    fn connected(&self) -> bool;

    /// No-op if already connected; dials otherwise.
    async fn connect(&self, deadline: Duration) -> Result<()>;

    async fn search(
        &self,
        index: &str,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
        deadline: Duration,
    ) -> Result<ShardSearchResponse>;

    async fn count(
        &self,
        index: &str,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
        deadline: Duration,
    ) -> Result<ShardCountResponse>;
}

/// QUIC-backed [`DataNodeClient`] against one real data node.
pub struct QuicDataNodeClient {
    node_id: NodeId,
    address: String,
    endpoint: quinn::Endpoint,
    connection: RwLock<Option<quinn::Connection>>,
}

impl QuicDataNodeClient {
    pub fn new(node_id: impl Into<NodeId>, address: impl Into<String>, tls: &TlsConfig) -> Result<Self> {
        let endpoint = make_client_endpoint(tls)?;
        Ok(Self {
            node_id: node_id.into(),
            address: address.into(),
            endpoint,
            connection: RwLock::new(None),
        })
    }

    fn live_connection(&self) -> Option<quinn::Connection> {
        let guard = self.connection.read();
        guard
            .as_ref()
            .filter(|c| c.close_reason().is_none())
            .cloned()
    }

    async fn dial(&self, deadline: Duration) -> Result<quinn::Connection> {
        let (addr, server_name) = resolve_addr(&self.address).await?;
        let connecting = self
            .endpoint
            .connect(addr, &server_name)
            .map_err(|e| ClusterError::ConnectionFailed(self.node_id.clone(), e.to_string()))?;

        let connection = tokio::time::timeout(deadline, connecting)
            .await
            .map_err(|_| ClusterError::ConnectionFailed(self.node_id.clone(), "dial timed out".into()))?
            .map_err(|e| ClusterError::ConnectionFailed(self.node_id.clone(), e.to_string()))?;

        *self.connection.write() = Some(connection.clone());
        Ok(connection)
    }

    async fn rpc_client(&self, deadline: Duration) -> Result<DataNodeServiceClient> {
        let connection = match self.live_connection() {
            Some(c) => c,
            None => self.dial(deadline).await?,
        };

        let (send, recv) = match connection.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(node_id = %self.node_id, "stream open failed on pooled connection: {e}, redialing");
                *self.connection.write() = None;
                let connection = self.dial(deadline).await?;
                connection.open_bi().await.map_err(|e| {
                    ClusterError::ConnectionFailed(self.node_id.clone(), format!("open stream: {e}"))
                })?
            }
        };

        let transport = tarpc::serde_transport::new(
            tokio_util::codec::Framed::new(QuicBiStream { send, recv }, LengthDelimitedCodec::new()),
            tarpc::tokio_serde::formats::Bincode::default(),
        );
        Ok(DataNodeServiceClient::new(TarpcConfig::default(), transport).spawn())
    }

    fn context(deadline: Duration) -> context::Context {
        let mut ctx = context::current();
        ctx.deadline = std::time::Instant::now() + deadline;
        ctx
    }
}

#[async_trait]
impl DataNodeClient for QuicDataNodeClient {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn connected(&self) -> bool {
        self.live_connection().is_some()
    }

    async fn connect(&self, deadline: Duration) -> Result<()> {
        if self.connected() {
            return Ok(());
        }
        self.dial(deadline).await.map(|_| ())
    }

    async fn search(
        &self,
        index: &str,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
        deadline: Duration,
    ) -> Result<ShardSearchResponse> {
        let client = self.rpc_client(deadline).await?;
        client
            .search(Self::context(deadline), index.to_string(), shard_id, query, filter)
            .await
            .map_err(|e| ClusterError::ShardSearchFailed(e.to_string()))?
    }

    async fn count(
        &self,
        index: &str,
        shard_id: ShardId,
        query: QueryBlob,
        filter: FilterBlob,
        deadline: Duration,
    ) -> Result<ShardCountResponse> {
        let client = self.rpc_client(deadline).await?;
        client
            .count(Self::context(deadline), index.to_string(), shard_id, query, filter)
            .await
            .map_err(|e| ClusterError::ShardSearchFailed(e.to_string()))?
    }
}

/// The pool of long-lived data-node clients, keyed by node-id.
///
/// A single reader/writer lock guards the map. `lookup`/`has` take only
/// a read lock; `register`/`unregister` take the write lock briefly.
#[derive(Default)]
pub struct DataNodePool {
    clients: RwLock<HashMap<NodeId, Arc<dyn DataNodeClient>>>,
}

impl DataNodePool {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a client keyed by its node-id, overwriting any prior entry.
    /// The prior client's in-flight calls continue on their own `Arc`.
    pub fn register(&self, client: Arc<dyn DataNodeClient>) {
        let node_id = client.node_id().to_string();
        let mut clients = self.clients.write();
        let replaced = clients.insert(node_id.clone(), client).is_some();
        let size = clients.len();
        drop(clients);
        record_pool_size(size);
        if replaced {
            debug!(node_id = %node_id, "data-node client replaced");
        } else {
            debug!(node_id = %node_id, "data-node client registered");
        }
    }

    /// Remove and return the client for `node_id`, if any.
    pub fn unregister(&self, node_id: &str) -> Option<Arc<dyn DataNodeClient>> {
        let mut clients = self.clients.write();
        let removed = clients.remove(node_id);
        let size = clients.len();
        drop(clients);
        record_pool_size(size);
        removed
    }

    pub fn lookup(&self, node_id: &str) -> Option<Arc<dyn DataNodeClient>> {
        self.clients.read().get(node_id).cloned()
    }

    pub fn has(&self, node_id: &str) -> bool {
        self.clients.read().contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeClient {
        id: String,
        connected: AtomicBool,
    }

    #[async_trait]
    impl DataNodeClient for FakeClient {
        fn node_id(&self) -> &str {
            &self.id
        }

        fn connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn connect(&self, _deadline: Duration) -> Result<()> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn search(
            &self,
            _index: &str,
            _shard_id: ShardId,
            _query: QueryBlob,
            _filter: FilterBlob,
            _deadline: Duration,
        ) -> Result<ShardSearchResponse> {
            Ok(ShardSearchResponse::default())
        }

        async fn count(
            &self,
            _index: &str,
            _shard_id: ShardId,
            _query: QueryBlob,
            _filter: FilterBlob,
            _deadline: Duration,
        ) -> Result<ShardCountResponse> {
            Ok(ShardCountResponse::default())
        }
    }

    fn fake(id: &str) -> Arc<dyn DataNodeClient> {
        Arc::new(FakeClient {
            id: id.to_string(),
            connected: AtomicBool::new(false),
        })
    }

    #[test]
    fn register_then_lookup_finds_client() {
        let pool = DataNodePool::new();
        pool.register(fake("node-1"));
        assert!(pool.has("node-1"));
        assert_eq!(pool.lookup("node-1").unwrap().node_id(), "node-1");
    }

    #[test]
    fn register_unregister_lookup_is_not_present() {
        let pool = DataNodePool::new();
        pool.register(fake("node-1"));
        assert!(pool.unregister("node-1").is_some());
        assert!(!pool.has("node-1"));
        assert!(pool.lookup("node-1").is_none());
    }

    #[test]
    fn re_register_replaces_prior_client() {
        let pool = DataNodePool::new();
        pool.register(fake("node-1"));
        pool.register(fake("node-1"));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn unregister_missing_is_none() {
        let pool = DataNodePool::new();
        assert!(pool.unregister("ghost").is_none());
    }
}
