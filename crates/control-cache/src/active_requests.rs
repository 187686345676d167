use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Per-node inflight-request counter. Incremented before the upstream
/// call begins and decremented once the response (or stream) is fully
/// handled or aborted — the scheduler's load signal and the property
/// under test in §8 #4.
#[derive(Clone, Default)]
pub struct ActiveRequestCounters {
    counts: Arc<DashMap<Uuid, AtomicI64>>,
}

/// RAII guard returned by `increment`; decrements on drop so a panicking
/// or early-returning request handler can never leak a counter.
pub struct ActiveRequestGuard {
    counts: Arc<DashMap<Uuid, AtomicI64>>,
    node_id: Uuid,
    released: bool,
}

impl ActiveRequestGuard {
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        if let Some(counter) = self.counts.get(&self.node_id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
        self.released = true;
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.do_release();
    }
}

impl ActiveRequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, node_id: Uuid) -> ActiveRequestGuard {
        self.counts
            .entry(node_id)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst);

        ActiveRequestGuard {
            counts: self.counts.clone(),
            node_id,
            released: false,
        }
    }

    pub fn current(&self, node_id: Uuid) -> i64 {
        self.counts
            .get(&node_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn remove_node(&self, node_id: Uuid) {
        self.counts.remove(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_then_release_returns_to_zero() {
        let counters = ActiveRequestCounters::new();
        let node = Uuid::new_v4();
        assert_eq!(counters.current(node), 0);
        let guard = counters.increment(node);
        assert_eq!(counters.current(node), 1);
        guard.release();
        assert_eq!(counters.current(node), 0);
    }

    #[test]
    fn drop_without_explicit_release_still_decrements() {
        let counters = ActiveRequestCounters::new();
        let node = Uuid::new_v4();
        {
            let _guard = counters.increment(node);
            assert_eq!(counters.current(node), 1);
        }
        assert_eq!(counters.current(node), 0);
    }
}
