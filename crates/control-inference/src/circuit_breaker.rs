use chrono::Utc;
use control_core::circuit_breaker::{BreakerState, CircuitBreakerState};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(30);

/// Per-node circuit breaker table. Every state transition happens inside
/// a single `DashMap::entry` critical section; the actual request
/// forwarding always happens outside the lock (§4.6, §5).
#[derive(Clone, Default)]
pub struct CircuitBreakerTable {
    breakers: Arc<DashMap<Uuid, CircuitBreakerState>>,
}

impl CircuitBreakerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request may currently be attempted against this node.
    /// An `Open` breaker past its cooldown transitions to `HalfOpen` and
    /// allows exactly the probe that calls this — callers must report the
    /// outcome via `record_success`/`record_failure`.
    pub fn allow_request(&self, node_id: Uuid) -> bool {
        let mut entry = self.breakers.entry(node_id).or_default();
        match entry.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = entry
                    .opened_at
                    .map(|t| Utc::now() - t)
                    .unwrap_or_default();
                if elapsed >= chrono::Duration::from_std(COOLDOWN).unwrap() {
                    entry.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, node_id: Uuid) {
        let mut entry = self.breakers.entry(node_id).or_default();
        entry.consecutive_failures = 0;
        entry.state = BreakerState::Closed;
        entry.opened_at = None;
    }

    pub fn record_failure(&self, node_id: Uuid) {
        let mut entry = self.breakers.entry(node_id).or_default();
        match entry.state {
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Open;
                entry.opened_at = Some(Utc::now());
                warn!(%node_id, "probe failed while half-open, reopening circuit");
            }
            _ => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= FAILURE_THRESHOLD {
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Utc::now());
                    warn!(%node_id, failures = entry.consecutive_failures, "circuit opened");
                }
            }
        }
    }

    pub fn state_of(&self, node_id: Uuid) -> BreakerState {
        self.breakers.get(&node_id).map(|e| e.state).unwrap_or(BreakerState::Closed)
    }

    pub fn remove_node(&self, node_id: Uuid) {
        self.breakers.remove(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let table = CircuitBreakerTable::new();
        let node = Uuid::new_v4();
        for _ in 0..FAILURE_THRESHOLD {
            assert!(table.allow_request(node));
            table.record_failure(node);
        }
        assert_eq!(table.state_of(node), BreakerState::Open);
        assert!(!table.allow_request(node));
    }

    #[test]
    fn success_resets_failure_count() {
        let table = CircuitBreakerTable::new();
        let node = Uuid::new_v4();
        table.record_failure(node);
        table.record_failure(node);
        table.record_success(node);
        assert_eq!(table.state_of(node), BreakerState::Closed);
        for _ in 0..(FAILURE_THRESHOLD - 1) {
            table.record_failure(node);
        }
        assert_eq!(table.state_of(node), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let table = CircuitBreakerTable::new();
        let node = Uuid::new_v4();
        for _ in 0..FAILURE_THRESHOLD {
            table.record_failure(node);
        }
        assert_eq!(table.state_of(node), BreakerState::Open);

        {
            let mut entry = table.breakers.get_mut(&node).unwrap();
            entry.opened_at = Some(Utc::now() - chrono::Duration::seconds(60));
        }
        assert!(table.allow_request(node));
        assert_eq!(table.state_of(node), BreakerState::HalfOpen);

        table.record_failure(node);
        assert_eq!(table.state_of(node), BreakerState::Open);
    }
}
