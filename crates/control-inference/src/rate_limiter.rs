use control_cache::TokenBucketStore;
use control_core::rate_limit::{RateLimitScope, RateLimitWindow};
use crate::errors::InferenceError;

/// A single scope/limit pair checked in order by `RateLimiter::check_all`.
pub struct ScopeLimit<'a> {
    pub scope: RateLimitScope,
    pub id: &'a str,
    pub window: RateLimitWindow,
    pub limit: u64,
}

/// Composes `control-cache`'s token buckets into the layered check the
/// gateway runs before every request: global, then tenant, then
/// environment, then key (§4.8). The first scope to reject wins — callers
/// stop checking further scopes once one fails, matching the fail-fast
/// behavior in §8.
#[derive(Clone, Default)]
pub struct RateLimiter {
    store: TokenBucketStore,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_all(&self, scopes: &[ScopeLimit<'_>]) -> Result<(), InferenceError> {
        for scope in scopes {
            let decision = self
                .store
                .check_and_decrement(scope.scope, scope.id, scope.window, scope.limit);
            if !decision.allowed {
                return Err(InferenceError::RateLimited(format!(
                    "{} {} exceeded its {:?} limit of {}",
                    scope.scope, scope.id, scope.window, scope.limit
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_rejects_before_key_scope_is_checked() {
        let limiter = RateLimiter::new();
        let scopes = vec![
            ScopeLimit {
                scope: RateLimitScope::Global,
                id: "global",
                window: RateLimitWindow::PerMinute,
                limit: 1,
            },
            ScopeLimit {
                scope: RateLimitScope::Key,
                id: "key-1",
                window: RateLimitWindow::PerMinute,
                limit: 1000,
            },
        ];

        assert!(limiter.check_all(&scopes).is_ok());
        assert!(limiter.check_all(&scopes).is_err());
    }
}
