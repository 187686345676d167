use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per completed inference. Immutable once written (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub api_key_id: Uuid,
    pub model_id: Uuid,
    pub node_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    pub cost: f64,
    pub request_id: Uuid,
    pub stream: bool,
    pub usage_missing: bool,
}

/// Aggregation of usage records per (tenant, model, environment, hour).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageHourly {
    pub tenant_id: Uuid,
    pub model_id: Uuid,
    pub environment_id: Uuid,
    pub hour: DateTime<Utc>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub request_count: u64,
    pub exported: bool,
}
