use crate::circuit_breaker::CircuitBreakerTable;
use control_cache::ActiveRequestCounters;
use control_core::model::SchedulingStrategy;
use control_core::node::Node;
use control_registry::NodeRegistry;
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Picks the node a request should land on. Strategy selection is
/// per-model (`Model::scheduling_strategy`); the scheduler itself is
/// stateless beyond the round-robin cursor, and never mutates the
/// registry — it only reads the candidate list, the breaker table, and
/// the active-request counters (§4.3, §5).
pub struct Scheduler {
    registry: NodeRegistry,
    active_requests: ActiveRequestCounters,
    breakers: CircuitBreakerTable,
    round_robin_cursor: AtomicU64,
}

impl Scheduler {
    pub fn new(registry: NodeRegistry, active_requests: ActiveRequestCounters, breakers: CircuitBreakerTable) -> Self {
        Self {
            registry,
            active_requests,
            breakers,
            round_robin_cursor: AtomicU64::new(0),
        }
    }

    /// Candidate set per §4.3: active/healthy/endpoint-bearing nodes for
    /// the model (from the registry) whose circuit is closed or
    /// half-open, narrowed to the tenant's reserved nodes first if any
    /// exist, then to the preferred region if any candidate matches it.
    pub fn select(&self, model_id: Uuid, tenant_id: Uuid, region_id: Option<Uuid>, strategy: SchedulingStrategy) -> Option<Node> {
        let mut candidates: Vec<Node> = self
            .registry
            .candidates_for(model_id)
            .into_iter()
            .filter(|node| self.breakers.allow_request(node.id))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let reserved: Vec<Node> = candidates.iter().filter(|n| n.tenant_id == Some(tenant_id)).cloned().collect();
        if !reserved.is_empty() {
            candidates = reserved;
        }

        if let Some(region_id) = region_id {
            let in_region: Vec<Node> = candidates.iter().filter(|n| n.region_id == region_id).cloned().collect();
            if !in_region.is_empty() {
                candidates = in_region;
            }
        }

        match strategy {
            SchedulingStrategy::LeastLoaded => self.least_loaded(&candidates),
            SchedulingStrategy::RoundRobin => self.round_robin(&candidates),
            SchedulingStrategy::Weighted => self.weighted(&candidates),
            SchedulingStrategy::Random => self.random(&candidates),
        }
    }

    /// Ties broken by highest health score, then lowest lexical node id,
    /// so repeated calls against an unchanged candidate set are
    /// deterministic (§4.3).
    fn least_loaded(&self, candidates: &[Node]) -> Option<Node> {
        candidates
            .iter()
            .min_by_key(|node| (self.active_requests.current(node.id), Reverse(node.health_score), node.id))
            .cloned()
    }

    fn round_robin(&self, candidates: &[Node]) -> Option<Node> {
        let index = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) as usize % candidates.len();
        candidates.get(index).cloned()
    }

    /// Weighted by `health_score / (1 + active_requests)` (§4.3): a
    /// healthier, idler node is proportionally more likely to be picked
    /// than a loaded or half-healthy one.
    fn weighted(&self, candidates: &[Node]) -> Option<Node> {
        let weights: Vec<u64> = candidates
            .iter()
            .map(|n| {
                let active = self.active_requests.current(n.id).max(0) as u64;
                (n.health_score as u64 * 1000) / (1 + active)
            })
            .collect();
        let total: u64 = weights.iter().sum();
        if total == 0 {
            return candidates.first().cloned();
        }

        let mut roll = rand::random::<u64>() % total;
        for (node, weight) in candidates.iter().zip(weights.iter()) {
            if roll < *weight {
                return Some(node.clone());
            }
            roll -= weight;
        }
        candidates.last().cloned()
    }

    fn random(&self, candidates: &[Node]) -> Option<Node> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_core::node::NodeStatus;
    use control_db::DbClient;

    async fn registry_with_nodes(model_id: Uuid, count: usize) -> NodeRegistry {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let registry = NodeRegistry::new(db);
        for _ in 0..count {
            let node = Node {
                id: Uuid::new_v4(),
                cluster_name: Node::derive_cluster_name("aws", "us-east-1"),
                tenant_id: None,
                model_id,
                region_id: Uuid::new_v4(),
                provider: "aws".into(),
                instance_typename: "g5.xlarge".into(),
                endpoint: Some("http://node".into()),
                spot: false,
                status: NodeStatus::Active,
                health_score: 100,
                last_heartbeat_at: Some(chrono::Utc::now()),
            };
            registry.register(node).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn least_loaded_prefers_idle_node() {
        let model_id = Uuid::new_v4();
        let registry = registry_with_nodes(model_id, 3).await;
        let active = ActiveRequestCounters::new();
        let candidates = registry.candidates_for(model_id);
        let busy = &candidates[0];
        let _held = active.increment(busy.id);
        let _held2 = active.increment(busy.id);

        let scheduler = Scheduler::new(registry, active, CircuitBreakerTable::new());
        let chosen = scheduler
            .select(model_id, Uuid::new_v4(), None, SchedulingStrategy::LeastLoaded)
            .unwrap();
        assert_ne!(chosen.id, busy.id);
    }

    #[tokio::test]
    async fn least_loaded_ties_break_on_health_then_node_id() {
        let model_id = Uuid::new_v4();
        let registry = registry_with_nodes(model_id, 3).await;
        let candidates = registry.candidates_for(model_id);
        let mut by_id: Vec<_> = candidates.iter().map(|n| n.id).collect();
        by_id.sort();
        let lowest_id = by_id[0];

        let scheduler = Scheduler::new(registry, ActiveRequestCounters::new(), CircuitBreakerTable::new());
        let chosen = scheduler
            .select(model_id, Uuid::new_v4(), None, SchedulingStrategy::LeastLoaded)
            .unwrap();
        assert_eq!(chosen.id, lowest_id);
    }

    #[tokio::test]
    async fn round_robin_cycles_through_all_candidates() {
        let model_id = Uuid::new_v4();
        let registry = registry_with_nodes(model_id, 3).await;
        let scheduler = Scheduler::new(registry, ActiveRequestCounters::new(), CircuitBreakerTable::new());

        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let node = scheduler
                .select(model_id, Uuid::new_v4(), None, SchedulingStrategy::RoundRobin)
                .unwrap();
            seen.insert(node.id);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn no_candidates_returns_none() {
        let model_id = Uuid::new_v4();
        let registry = registry_with_nodes(Uuid::new_v4(), 2).await;
        let scheduler = Scheduler::new(registry, ActiveRequestCounters::new(), CircuitBreakerTable::new());
        assert!(scheduler
            .select(model_id, Uuid::new_v4(), None, SchedulingStrategy::LeastLoaded)
            .is_none());
    }

    #[tokio::test]
    async fn breaker_open_node_is_excluded_from_the_candidate_set() {
        let model_id = Uuid::new_v4();
        let registry = registry_with_nodes(model_id, 2).await;
        let candidates = registry.candidates_for(model_id);
        let broken = candidates[0].id;

        let breakers = CircuitBreakerTable::new();
        for _ in 0..10 {
            breakers.record_failure(broken);
        }

        let scheduler = Scheduler::new(registry, ActiveRequestCounters::new(), breakers);
        let chosen = scheduler
            .select(model_id, Uuid::new_v4(), None, SchedulingStrategy::LeastLoaded)
            .unwrap();
        assert_ne!(chosen.id, broken);
    }

    #[tokio::test]
    async fn tenant_reserved_nodes_are_preferred_over_the_shared_pool() {
        let model_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let registry = registry_with_nodes(model_id, 2).await;
        let reserved = Node {
            id: Uuid::new_v4(),
            cluster_name: Node::derive_cluster_name("aws", "us-east-1"),
            tenant_id: Some(tenant_id),
            model_id,
            region_id: Uuid::new_v4(),
            provider: "aws".into(),
            instance_typename: "g5.xlarge".into(),
            endpoint: Some("http://reserved-node".into()),
            spot: false,
            status: NodeStatus::Active,
            health_score: 100,
            last_heartbeat_at: Some(chrono::Utc::now()),
        };
        registry.register(reserved.clone()).await.unwrap();

        let scheduler = Scheduler::new(registry, ActiveRequestCounters::new(), CircuitBreakerTable::new());
        let chosen = scheduler
            .select(model_id, tenant_id, None, SchedulingStrategy::RoundRobin)
            .unwrap();
        assert_eq!(chosen.id, reserved.id);
    }
}
