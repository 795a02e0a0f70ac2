//! Query executor (C3), §4.3.
//!
//! The scatter/gather engine: reads a read-only routing snapshot from C1,
//! fans one parallel unit of work out per eligible shard via C2, and
//! feeds whatever succeeded into the aggregator (C4). A shard failure is
//! recorded but never aborts the call while at least one other shard
//! succeeds (§4.3.4).

use crate::aggregation::merge_aggregations;
use crate::config::ExecutorConfig;
use crate::error::{ClusterError, Result};
use crate::metrics::{
    record_hits_total, record_search_latency, record_shard_query_failure, record_shards_queried,
    ShardQueryTimer,
};
use crate::pool::DataNodePool;
use crate::routing::ClusterStateClient;
use crate::types::{FilterBlob, Hit, NodeId, QueryBlob, SearchResult, ShardId, ShardStats};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Scatter/gather search and count execution over a shard routing.
pub struct QueryExecutor {
    cluster_state: Arc<dyn ClusterStateClient>,
    pool: Arc<DataNodePool>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(cluster_state: Arc<dyn ClusterStateClient>, pool: Arc<DataNodePool>, config: ExecutorConfig) -> Self {
        Self { cluster_state, pool, config }
    }

    /// §4.3.1-4.3.4: fan a search out to every `STARTED` shard of `index`,
    /// merge the successful responses, and paginate globally.
    pub async fn execute_search(
        &self,
        index: &str,
        query: QueryBlob,
        filter: FilterBlob,
        from: i64,
        size: i64,
        deadline: Option<Duration>,
    ) -> Result<SearchResult> {
        let start = Instant::now();
        let deadline = deadline.unwrap_or_else(|| self.config.default_deadline());

        let routing = self
            .cluster_state
            .get_shard_routing(index, deadline)
            .await
            .map_err(|e| ClusterError::RoutingUnavailable(e.to_string()))?;

        let mut eligible: Vec<(ShardId, NodeId)> = routing
            .iter()
            .filter_map(|(shard_id, alloc)| {
                if alloc.is_eligible() {
                    Some((*shard_id, alloc.node_id.clone()))
                } else {
                    if alloc.node_id.is_empty() && alloc.state == crate::types::ShardState::Started {
                        warn!(index, shard_id, "skipping shard with empty node-id");
                    }
                    None
                }
            })
            .collect();
        eligible.sort_by_key(|(shard_id, _)| *shard_id);

        if eligible.is_empty() {
            return Ok(SearchResult::default());
        }

        let handles = eligible.into_iter().map(|(shard_id, node_id)| {
            let pool = Arc::clone(&self.pool);
            let index = index.to_string();
            let query = query.clone();
            let filter = filter.clone();
            tokio::spawn(run_search_shard(pool, index, shard_id, node_id, query, filter, deadline))
        });

        let results = futures::future::join_all(handles).await;

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for joined in results {
            match joined {
                Ok((_, _, Ok(response))) => successes.push(response),
                Ok((_, _, Err(e))) => failures.push(e),
                Err(join_err) => failures.push(ClusterError::ShardSearchFailed(join_err.to_string())),
            }
        }

        let total = successes.len() + failures.len();
        if successes.is_empty() {
            let first = failures.into_iter().next().expect("total > 0 implies a failure exists");
            return Err(ClusterError::AllShardsFailed(Box::new(first)));
        }

        let mut all_hits: Vec<Hit> = Vec::new();
        let mut total_hits = 0u64;
        let mut max_score = 0.0f64;
        let mut agg_maps = Vec::with_capacity(successes.len());
        for response in &successes {
            all_hits.extend(response.hits.iter().cloned());
            total_hits += response.total_hits;
            max_score = max_score.max(response.max_score);
            agg_maps.push(response.aggregations.clone());
        }

        all_hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        let (from, size) = normalize_pagination(from, size);
        let start_idx = from.min(all_hits.len());
        let end_idx = start_idx.saturating_add(size).min(all_hits.len());
        let hits = all_hits[start_idx..end_idx].to_vec();

        let aggregations = merge_aggregations(&agg_maps);
        let shards = ShardStats {
            total: total as u32,
            successful: successes.len() as u32,
            failed: failures.len() as u32,
        };

        record_search_latency(index, start.elapsed());
        record_hits_total(index, total_hits);
        record_shards_queried(index, total as u32);

        Ok(SearchResult {
            took_ms: start.elapsed().as_millis() as u64,
            total_hits,
            max_score,
            hits,
            aggregations,
            shards,
        })
    }

    /// Identical dispatch algorithm, substituting the per-shard `count`
    /// operation and summing successful shards' counts (§4.3).
    pub async fn execute_count(
        &self,
        index: &str,
        query: QueryBlob,
        filter: FilterBlob,
        deadline: Option<Duration>,
    ) -> Result<i64> {
        let deadline = deadline.unwrap_or_else(|| self.config.default_deadline());

        let routing = self
            .cluster_state
            .get_shard_routing(index, deadline)
            .await
            .map_err(|e| ClusterError::RoutingUnavailable(e.to_string()))?;

        let mut eligible: Vec<(ShardId, NodeId)> = routing
            .iter()
            .filter_map(|(shard_id, alloc)| alloc.is_eligible().then(|| (*shard_id, alloc.node_id.clone())))
            .collect();
        eligible.sort_by_key(|(shard_id, _)| *shard_id);

        if eligible.is_empty() {
            return Ok(0);
        }

        let handles = eligible.into_iter().map(|(shard_id, node_id)| {
            let pool = Arc::clone(&self.pool);
            let index = index.to_string();
            let query = query.clone();
            let filter = filter.clone();
            tokio::spawn(run_count_shard(pool, index, shard_id, node_id, query, filter, deadline))
        });

        let results = futures::future::join_all(handles).await;

        let mut total: i64 = 0;
        let mut successful = 0u32;
        let mut failures = Vec::new();
        for joined in results {
            match joined {
                Ok((_, _, Ok(count))) => {
                    total += count as i64;
                    successful += 1;
                }
                Ok((_, _, Err(e))) => failures.push(e),
                Err(join_err) => failures.push(ClusterError::ShardSearchFailed(join_err.to_string())),
            }
        }

        if successful == 0 {
            let first = failures.into_iter().next().expect("total > 0 implies a failure exists");
            return Err(ClusterError::AllShardsFailed(Box::new(first)));
        }
        Ok(total)
    }
}

/// `from`/`size` are clamped to non-negative; out-of-range slicing is the
/// caller's responsibility via `.min(len)` at the call site (§4.3.3).
fn normalize_pagination(from: i64, size: i64) -> (usize, usize) {
    (from.max(0) as usize, size.max(0) as usize)
}

async fn run_search_shard(
    pool: Arc<DataNodePool>,
    index: String,
    shard_id: ShardId,
    node_id: NodeId,
    query: QueryBlob,
    filter: FilterBlob,
    deadline: Duration,
) -> (ShardId, NodeId, Result<crate::types::ShardSearchResponse>) {
    let client = match pool.lookup(&node_id) {
        Some(client) => client,
        None => {
            record_shard_query_failure(&index, shard_id, &node_id, "client_not_found");
            return (shard_id, node_id.clone(), Err(ClusterError::ClientNotFound(node_id)));
        }
    };

    if !client.connected() {
        if let Err(e) = client.connect(deadline).await {
            record_shard_query_failure(&index, shard_id, &node_id, "connection_failed");
            return (
                shard_id,
                node_id.clone(),
                Err(ClusterError::ConnectionFailed(node_id, e.to_string())),
            );
        }
    }

    let timer = ShardQueryTimer::new(&index, shard_id, &node_id);
    match tokio::time::timeout(deadline, client.search(&index, shard_id, query, filter, deadline)).await {
        Ok(Ok(response)) => {
            timer.success();
            (shard_id, node_id, Ok(response))
        }
        Ok(Err(e)) => {
            timer.error(e.error_type());
            (shard_id, node_id, Err(e))
        }
        Err(_) => {
            timer.error("deadline_exceeded");
            let msg = format!("shard {shard_id} on node {node_id}");
            (shard_id, node_id, Err(ClusterError::DeadlineExceeded(msg)))
        }
    }
}

async fn run_count_shard(
    pool: Arc<DataNodePool>,
    index: String,
    shard_id: ShardId,
    node_id: NodeId,
    query: QueryBlob,
    filter: FilterBlob,
    deadline: Duration,
) -> (ShardId, NodeId, Result<u64>) {
    let client = match pool.lookup(&node_id) {
        Some(client) => client,
        None => {
            record_shard_query_failure(&index, shard_id, &node_id, "client_not_found");
            return (shard_id, node_id.clone(), Err(ClusterError::ClientNotFound(node_id)));
        }
    };

    if !client.connected() {
        if let Err(e) = client.connect(deadline).await {
            record_shard_query_failure(&index, shard_id, &node_id, "connection_failed");
            return (
                shard_id,
                node_id.clone(),
                Err(ClusterError::ConnectionFailed(node_id, e.to_string())),
            );
        }
    }

    let timer = ShardQueryTimer::new(&index, shard_id, &node_id);
    match tokio::time::timeout(deadline, client.count(&index, shard_id, query, filter, deadline)).await {
        Ok(Ok(response)) => {
            timer.success();
            (shard_id, node_id, Ok(response.count))
        }
        Ok(Err(e)) => {
            timer.error(e.error_type());
            (shard_id, node_id, Err(e))
        }
        Err(_) => {
            timer.error("deadline_exceeded");
            let msg = format!("shard {shard_id} on node {node_id}");
            (shard_id, node_id, Err(ClusterError::DeadlineExceeded(msg)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::tests_support::FakeClusterStateClient;
    use crate::types::{ShardAllocation, ShardCountResponse, ShardSearchResponse, ShardState};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    struct ScriptedClient {
        id: String,
        response: Result<ShardSearchResponse>,
    }

    #[async_trait]
    impl crate::pool::DataNodeClient for ScriptedClient {
        fn node_id(&self) -> &str {
            &self.id
        }
        fn connected(&self) -> bool {
            true
        }
        async fn connect(&self, _deadline: Duration) -> Result<()> {
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
            self.response.clone()
        }
        async fn count(
            &self,
            _index: &str,
            _shard_id: ShardId,
            _query: QueryBlob,
            _filter: FilterBlob,
            _deadline: Duration,
        ) -> Result<ShardCountResponse> {
            self.response.clone().map(|r| ShardCountResponse { count: r.total_hits })
        }
    }

    struct UnconnectableClient {
        id: String,
    }

    #[async_trait]
    impl crate::pool::DataNodeClient for UnconnectableClient {
        fn node_id(&self) -> &str {
            &self.id
        }
        fn connected(&self) -> bool {
            false
        }
        async fn connect(&self, _deadline: Duration) -> Result<()> {
            Err(ClusterError::ConnectionFailed(self.id.clone(), "refused".into()))
        }
        async fn search(
            &self,
            _index: &str,
            _shard_id: ShardId,
            _query: QueryBlob,
            _filter: FilterBlob,
            _deadline: Duration,
        ) -> Result<ShardSearchResponse> {
            unreachable!("connect should fail before search is attempted")
        }
        async fn count(
            &self,
            _index: &str,
            _shard_id: ShardId,
            _query: QueryBlob,
            _filter: FilterBlob,
            _deadline: Duration,
        ) -> Result<ShardCountResponse> {
            unreachable!("connect should fail before count is attempted")
        }
    }

    fn hit(doc_id: &str, score: f64) -> Hit {
        Hit { doc_id: doc_id.into(), score, source: HashMap::new() }
    }

    fn setup(shard_count: usize) -> (Arc<FakeClusterStateClient>, Arc<DataNodePool>) {
        let fake = Arc::new(FakeClusterStateClient::default());
        let mut routing = HashMap::new();
        for i in 0..shard_count {
            routing.insert(
                i as ShardId,
                ShardAllocation { node_id: format!("node-{i}"), state: ShardState::Started },
            );
        }
        fake.routing.write().insert("products".to_string(), routing);
        (fake, Arc::new(DataNodePool::new()))
    }

    #[tokio::test]
    async fn two_shard_match_all_merges_hits_and_totals() {
        let (fake, pool) = setup(2);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse {
                hits: vec![hit("d1", 0.95), hit("d2", 0.90)],
                total_hits: 50,
                max_score: 0.95,
                aggregations: HashMap::new(),
            }),
        }));
        pool.register(Arc::new(ScriptedClient {
            id: "node-1".into(),
            response: Ok(ShardSearchResponse {
                hits: vec![hit("d3", 0.98), hit("d4", 0.85)],
                total_hits: 45,
                max_score: 0.98,
                aggregations: HashMap::new(),
            }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();

        assert_eq!(result.total_hits, 95);
        assert_eq!(result.max_score, 0.98);
        let ids: Vec<&str> = result.hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["d3", "d1", "d2", "d4"]);
    }

    #[tokio::test]
    async fn global_pagination_slices_after_sort() {
        let (fake, pool) = setup(1);
        let hits: Vec<Hit> = (0..100)
            .map(|i| hit(&format!("A{i:03}"), (100 - i) as f64))
            .collect();
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse { hits, total_hits: 100, max_score: 100.0, aggregations: HashMap::new() }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 10, 5, None)
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 5);
        assert_eq!(result.hits[0].doc_id, "A010");
        assert_eq!(result.hits[4].doc_id, "A014");
    }

    #[tokio::test]
    async fn partial_shard_failure_does_not_abort_call() {
        let (fake, pool) = setup(3);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 30, max_score: 0.0, aggregations: HashMap::new() }),
        }));
        pool.register(Arc::new(UnconnectableClient { id: "node-1".into() }));
        pool.register(Arc::new(ScriptedClient {
            id: "node-2".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 35, max_score: 0.0, aggregations: HashMap::new() }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();

        assert_eq!(result.total_hits, 65);
        assert_eq!(result.shards.successful, 2);
        assert_eq!(result.shards.failed, 1);
    }

    #[tokio::test]
    async fn all_shards_failing_fails_the_whole_call() {
        let (fake, pool) = setup(1);
        pool.register(Arc::new(UnconnectableClient { id: "node-0".into() }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let err = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::AllShardsFailed(_)));
    }

    #[tokio::test]
    async fn zero_started_shards_returns_zero_result_not_error() {
        let fake = Arc::new(FakeClusterStateClient::default());
        let mut routing = HashMap::new();
        routing.insert(0, ShardAllocation { node_id: "node-0".into(), state: ShardState::Initializing });
        fake.routing.write().insert("products".to_string(), routing);
        let pool = Arc::new(DataNodePool::new());

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();

        assert_eq!(result.total_hits, 0);
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn empty_index_routing_is_zero_result_not_error() {
        let fake = Arc::new(FakeClusterStateClient::default());
        fake.routing.write().insert("empty-index".to_string(), HashMap::new());
        let pool = Arc::new(DataNodePool::new());

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("empty-index", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();
        assert_eq!(result.total_hits, 0);
    }

    #[tokio::test]
    async fn routing_unavailable_fails_whole_call() {
        let fake = Arc::new(FakeClusterStateClient::default());
        fake.fail_routing.store(true, Ordering::SeqCst);
        let pool = Arc::new(DataNodePool::new());

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let err = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::RoutingUnavailable(_)));
    }

    #[tokio::test]
    async fn from_beyond_length_yields_empty_slice() {
        let (fake, pool) = setup(1);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse {
                hits: vec![hit("d1", 1.0)],
                total_hits: 1,
                max_score: 1.0,
                aggregations: HashMap::new(),
            }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 1000, 10, None)
            .await
            .unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.total_hits, 1);
    }

    #[tokio::test]
    async fn negative_from_and_size_are_normalized_to_zero() {
        let (fake, pool) = setup(1);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse {
                hits: vec![hit("d1", 1.0)],
                total_hits: 1,
                max_score: 1.0,
                aggregations: HashMap::new(),
            }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), -5, -5, None)
            .await
            .unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.total_hits, 1);
    }

    #[tokio::test]
    async fn size_zero_returns_empty_hits_but_correct_total() {
        let (fake, pool) = setup(1);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse {
                hits: vec![hit("d1", 1.0), hit("d2", 0.5)],
                total_hits: 2,
                max_score: 1.0,
                aggregations: HashMap::new(),
            }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 0, None)
            .await
            .unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.total_hits, 2);
    }

    #[tokio::test]
    async fn client_not_found_counts_as_shard_failure() {
        let (fake, pool) = setup(2);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 10, max_score: 0.0, aggregations: HashMap::new() }),
        }));
        // node-1 is never registered.

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();
        assert_eq!(result.shards.failed, 1);
        assert_eq!(result.total_hits, 10);
    }

    #[tokio::test]
    async fn execute_count_sums_successful_shards() {
        let (fake, pool) = setup(2);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 12, max_score: 0.0, aggregations: HashMap::new() }),
        }));
        pool.register(Arc::new(ScriptedClient {
            id: "node-1".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 8, max_score: 0.0, aggregations: HashMap::new() }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let count = executor
            .execute_count("products", QueryBlob::new(), FilterBlob::new(), None)
            .await
            .unwrap();
        assert_eq!(count, 20);
    }

    #[tokio::test]
    async fn zero_hit_shard_is_a_successful_contributor() {
        let (fake, pool) = setup(1);
        pool.register(Arc::new(ScriptedClient {
            id: "node-0".into(),
            response: Ok(ShardSearchResponse { hits: vec![], total_hits: 0, max_score: 0.0, aggregations: HashMap::new() }),
        }));

        let executor = QueryExecutor::new(fake, pool, ExecutorConfig::default());
        let result = executor
            .execute_search("products", QueryBlob::new(), FilterBlob::new(), 0, 10, None)
            .await
            .unwrap();
        assert_eq!(result.shards.successful, 1);
        assert_eq!(result.shards.failed, 0);
        assert_eq!(result.total_hits, 0);
    }
}
