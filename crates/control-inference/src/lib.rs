pub mod circuit_breaker;
pub mod errors;
pub mod meter;
pub mod proxy;
pub mod rate_limiter;
pub mod scheduler;

pub use circuit_breaker::CircuitBreakerTable;
pub use errors::InferenceError;
pub use meter::UsageMeter;
pub use proxy::InferenceProxy;
pub use rate_limiter::RateLimiter;
pub use scheduler::Scheduler;
