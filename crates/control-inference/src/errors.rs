use control_core::error::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no schedulable node for this model")]
    NoAvailableNodes,

    #[error("circuit breaker is open for node {0}")]
    BreakerOpen(uuid::Uuid),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("rate limit exceeded for {0}")]
    RateLimited(String),
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        let kind = match &err {
            InferenceError::NoAvailableNodes | InferenceError::BreakerOpen(_) => ErrorKind::NoAvailableNodes,
            InferenceError::Upstream(_) => ErrorKind::UpstreamError,
            InferenceError::UpstreamTimeout => ErrorKind::UpstreamTimeout,
            InferenceError::RateLimited(_) => ErrorKind::RateLimitExceeded,
        };
        ApiError::new(kind, err.to_string())
    }
}
