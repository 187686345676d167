use serde::Serialize;
use std::fmt;

/// Stable error taxonomy shared across every layer (§7). Each kind maps
/// to exactly one HTTP status at the gateway edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    AuthError,
    Forbidden,
    InvalidRequest,
    ValidationError,
    NotFound,
    Conflict,
    RateLimitExceeded,
    NoAvailableNodes,
    UpstreamError,
    UpstreamTimeout,
    ProvisioningUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::AuthError => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::ValidationError => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimitExceeded => 429,
            ErrorKind::NoAvailableNodes => 503,
            ErrorKind::UpstreamError => 502,
            ErrorKind::UpstreamTimeout => 504,
            ErrorKind::ProvisioningUnavailable => 503,
            ErrorKind::InternalError => 500,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::AuthError => "auth_error",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::NoAvailableNodes => "no_available_nodes",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::ProvisioningUnavailable => "provisioning_unavailable",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The `{"error": {"type", "message", "code"}}` body every failed
/// request receives (§7). `message` is human-readable and safe to show;
/// internal detail (stack traces, SQL fragments) never ends up here —
/// it's logged server-side under `request_id` instead.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: uuid::Uuid,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id: uuid::Uuid::new_v4(),
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "type": self.kind.to_string(),
                "message": self.message,
                "code": self.kind.code(),
            }
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}
