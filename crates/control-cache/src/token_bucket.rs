use chrono::{DateTime, Utc};
use control_core::{RateLimitScope, RateLimitWindow};
use dashmap::DashMap;
use std::sync::Arc;

/// Logical key = `(scope, id, window)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    scope: RateLimitScope,
    id: String,
    window: RateLimitWindow,
}

#[derive(Debug, Clone)]
struct BucketValue {
    remaining: u64,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Holds every `(scope, id, window)` token bucket in the process.
/// `check_and_decrement` is the atomic "read current count and window;
/// if window expired, reset; if count < limit, increment, else reject"
/// script from §4.8, implemented as a single `DashMap::entry` critical
/// section so no two callers race on the same key.
#[derive(Clone, Default)]
pub struct TokenBucketStore {
    buckets: Arc<DashMap<BucketKey, BucketValue>>,
}

impl TokenBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic within a window: `remaining` only decreases until the
    /// window boundary resets it (§8 testable property 7).
    pub fn check_and_decrement(
        &self,
        scope: RateLimitScope,
        id: &str,
        window: RateLimitWindow,
        limit: u64,
    ) -> BucketDecision {
        let key = BucketKey {
            scope,
            id: id.to_string(),
            window,
        };
        let now = Utc::now();

        let mut entry = self.buckets.entry(key).or_insert_with(|| BucketValue {
            remaining: limit,
            reset_at: now + chrono::Duration::seconds(window.duration_seconds()),
        });

        if now >= entry.reset_at {
            entry.remaining = limit;
            entry.reset_at = now + chrono::Duration::seconds(window.duration_seconds());
        }

        if entry.remaining == 0 {
            return BucketDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.remaining -= 1;
        BucketDecision {
            allowed: true,
            remaining: entry.remaining,
            reset_at: entry.reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_resets_is_monotonic_within_window() {
        let store = TokenBucketStore::new();
        let mut last_remaining = u64::MAX;

        for _ in 0..3 {
            let d = store.check_and_decrement(RateLimitScope::Key, "k1", RateLimitWindow::PerMinute, 3);
            assert!(d.allowed);
            assert!(d.remaining < last_remaining || last_remaining == u64::MAX);
            last_remaining = d.remaining;
        }

        let exhausted = store.check_and_decrement(RateLimitScope::Key, "k1", RateLimitWindow::PerMinute, 3);
        assert!(!exhausted.allowed);
        assert_eq!(exhausted.remaining, 0);
    }

    #[test]
    fn scopes_are_independent() {
        let store = TokenBucketStore::new();
        store.check_and_decrement(RateLimitScope::Key, "a", RateLimitWindow::PerMinute, 1);
        let other = store.check_and_decrement(RateLimitScope::Tenant, "a", RateLimitWindow::PerMinute, 1);
        assert!(other.allowed);
    }
}
