//! Background node discovery (continuous integration between C1 and C2), §4.2.
//!
//! Polls the cluster-state authority's `list-nodes` at a fixed cadence.
//! Nodes absent from the pool are dialed and registered; dial failures
//! are logged and swallowed so other candidates still register. Nodes
//! that vanish from the authority's list are NOT auto-unregistered here;
//! eviction on failure is a separate concern (§4.2, §9).

use crate::config::DiscoveryConfig;
use crate::pool::{DataNodeClient, DataNodePool};
use crate::routing::ClusterStateClient;
use crate::types::NodeDescriptor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a [`DataNodeClient`] for a freshly discovered node. Boxed so the
/// loop doesn't need to know about QUIC/TLS construction details.
pub type ClientFactory = Arc<dyn Fn(&NodeDescriptor) -> Arc<dyn DataNodeClient> + Send + Sync>;

/// Drives the discovery loop described in §4.2. Owned exclusively by the
/// coordinating node alongside the pool (§9); the executor only borrows
/// the pool.
pub struct DiscoveryLoop {
    cluster_state: Arc<dyn ClusterStateClient>,
    pool: Arc<DataNodePool>,
    factory: ClientFactory,
    config: DiscoveryConfig,
}

impl DiscoveryLoop {
    pub fn new(
        cluster_state: Arc<dyn ClusterStateClient>,
        pool: Arc<DataNodePool>,
        factory: ClientFactory,
        config: DiscoveryConfig,
    ) -> Self {
        Self { cluster_state, pool, factory, config }
    }

    /// Run one discovery cycle: fetch the authority's node directory,
    /// dial and register every node not already in the pool.
    pub async fn tick(&self) {
        let nodes = match self.cluster_state.list_nodes(self.config.deadline()).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("discovery: list-nodes failed, skipping this cycle: {e}");
                return;
            }
        };

        for node in nodes {
            if self.pool.has(&node.node_id) {
                continue;
            }
            let client = (self.factory)(&node);
            match client.connect(self.config.deadline()).await {
                Ok(()) => {
                    info!(node_id = %node.node_id, address = %node.address, "discovered and connected to new data node");
                }
                Err(e) => {
                    warn!(node_id = %node.node_id, address = %node.address, "discovery: dial failed, registering anyway for lazy reconnect: {e}");
                }
            }
            self.pool.register(client);
        }
    }

    /// Poll forever at the configured cadence until `shutdown` resolves.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    debug!("discovery loop shutting down");
                    return;
                }
            }
        }
    }
}
