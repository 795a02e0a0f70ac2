//! The coordinating node (§9): exclusively owns the data-node pool (C2)
//! and the discovery loop; the executor (C3) only borrows the pool.
//!
//! Shutdown order matters (§9): cancel the discovery loop first, then let
//! in-flight searches unwind against their own deadlines, then the pool
//! drops with `self`.

use crate::config::CoreConfig;
use crate::discovery::{ClientFactory, DiscoveryLoop};
use crate::executor::QueryExecutor;
use crate::pool::DataNodePool;
use crate::routing::ClusterStateClient;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Coordinator {
    pool: Arc<DataNodePool>,
    executor: QueryExecutor,
    discovery_shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    discovery_handle: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// Wires C1 (already constructed by the caller), C2, C3 and the
    /// discovery loop together, and spawns the discovery loop immediately.
    pub fn new(cluster_state: Arc<dyn ClusterStateClient>, node_client_factory: ClientFactory, config: CoreConfig) -> Self {
        let pool = Arc::new(DataNodePool::new());
        let executor = QueryExecutor::new(Arc::clone(&cluster_state), Arc::clone(&pool), config.executor);

        let discovery = Arc::new(DiscoveryLoop::new(
            cluster_state,
            Arc::clone(&pool),
            node_client_factory,
            config.discovery,
        ));
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(discovery.run(shutdown_rx));

        Self {
            pool,
            executor,
            discovery_shutdown: Some(shutdown_tx),
            discovery_handle: Some(handle),
        }
    }

    pub fn pool(&self) -> &Arc<DataNodePool> {
        &self.pool
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Cancel the discovery loop and wait for it to exit. In-flight
    /// searches are left to finish against their own deadlines; the pool
    /// itself is released when the `Coordinator` is dropped.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.discovery_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.discovery_handle.take() {
            let _ = handle.await;
        }
    }
}
