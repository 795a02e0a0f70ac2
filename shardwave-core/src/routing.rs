//! Cluster-state client (C1), §4.1.
//!
//! A thin RPC facade over the cluster-state authority. Side-effect-free
//! and idempotent by contract: callers may cache a result for the
//! lifetime of one request but must not cache across requests, since
//! allocation changes are continuous.

use crate::config::TlsConfig;
use crate::error::{ClusterError, Result};
use crate::rpc::ClusterStateServiceClient;
use crate::transport::{make_client_endpoint, resolve_addr, QuicBiStream};
use crate::types::{NodeDescriptor, ShardRouting};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;
use tarpc::client::Config as TarpcConfig;
use tarpc::context;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::warn;

/// The cluster-state authority's contract as consumed by the executor
/// (C3) and the discovery loop.
#[async_trait]
pub trait ClusterStateClient: Send + Sync {
    async fn get_shard_routing(&self, index: &str, deadline: Duration) -> Result<ShardRouting>;

    async fn list_nodes(&self, deadline: Duration) -> Result<Vec<NodeDescriptor>>;
}

/// QUIC-backed [`ClusterStateClient`] against the real authority.
pub struct QuicClusterStateClient {
    address: String,
    endpoint: quinn::Endpoint,
    connection: RwLock<Option<quinn::Connection>>,
}

impl QuicClusterStateClient {
    pub fn new(address: impl Into<String>, tls: &TlsConfig) -> Result<Self> {
        let endpoint = make_client_endpoint(tls)?;
        Ok(Self {
            address: address.into(),
            endpoint,
            connection: RwLock::new(None),
        })
    }

    fn live_connection(&self) -> Option<quinn::Connection> {
        let guard = self.connection.read();
        guard.as_ref().filter(|c| c.close_reason().is_none()).cloned()
    }

    async fn dial(&self, deadline: Duration) -> Result<quinn::Connection> {
        let (addr, server_name) = resolve_addr(&self.address).await?;
        let connecting = self
            .endpoint
            .connect(addr, &server_name)
            .map_err(|e| ClusterError::AuthorityUnavailable(e.to_string()))?;

        let connection = tokio::time::timeout(deadline, connecting)
            .await
            .map_err(|_| ClusterError::AuthorityUnavailable("dial timed out".into()))?
            .map_err(|e| ClusterError::AuthorityUnavailable(e.to_string()))?;

        *self.connection.write() = Some(connection.clone());
        Ok(connection)
    }

    async fn rpc_client(&self, deadline: Duration) -> Result<ClusterStateServiceClient> {
        let connection = match self.live_connection() {
            Some(c) => c,
            None => self.dial(deadline).await?,
        };

        let (send, recv) = match connection.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                warn!("stream open failed against cluster-state authority: {e}, redialing");
                *self.connection.write() = None;
                let connection = self.dial(deadline).await?;
                connection
                    .open_bi()
                    .await
                    .map_err(|e| ClusterError::AuthorityUnavailable(format!("open stream: {e}")))?
            }
        };

        let transport = tarpc::serde_transport::new(
            tokio_util::codec::Framed::new(QuicBiStream { send, recv }, LengthDelimitedCodec::new()),
            tarpc::tokio_serde::formats::Bincode::default(),
        );
        Ok(ClusterStateServiceClient::new(TarpcConfig::default(), transport).spawn())
    }

    fn context(deadline: Duration) -> context::Context {
        let mut ctx = context::current();
        ctx.deadline = std::time::Instant::now() + deadline;
        ctx
    }
}

#[async_trait]
impl ClusterStateClient for QuicClusterStateClient {
    async fn get_shard_routing(&self, index: &str, deadline: Duration) -> Result<ShardRouting> {
        let client = self.rpc_client(deadline).await?;
        client
            .get_shard_routing(Self::context(deadline), index.to_string())
            .await
            .map_err(|e| ClusterError::AuthorityUnavailable(e.to_string()))?
    }

    async fn list_nodes(&self, deadline: Duration) -> Result<Vec<NodeDescriptor>> {
        let client = self.rpc_client(deadline).await?;
        client
            .list_nodes(Self::context(deadline))
            .await
            .map_err(|e| ClusterError::AuthorityUnavailable(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! An in-memory [`ClusterStateClient`] used by executor and discovery
    //! tests so they don't need a live QUIC authority.
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeClusterStateClient {
        pub routing: RwLock<HashMap<String, ShardRouting>>,
        pub nodes: RwLock<Vec<NodeDescriptor>>,
        pub fail_routing: std::sync::atomic::AtomicBool,
        pub fail_nodes: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ClusterStateClient for FakeClusterStateClient {
        async fn get_shard_routing(&self, index: &str, _deadline: Duration) -> Result<ShardRouting> {
            if self.fail_routing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ClusterError::AuthorityUnavailable("forced failure".into()));
            }
            Ok(self.routing.read().get(index).cloned().unwrap_or_default())
        }

        async fn list_nodes(&self, _deadline: Duration) -> Result<Vec<NodeDescriptor>> {
            if self.fail_nodes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ClusterError::AuthorityUnavailable("forced failure".into()));
            }
            Ok(self.nodes.read().clone())
        }
    }
}
