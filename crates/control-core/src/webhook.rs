use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    SubscriptionUpdated,
    InvoicePaid,
    PaymentFailed,
}

/// Processing a given `event_id` happens at most once — guaranteed by a
/// unique constraint on `event_id` in the store, not by this type (§3,
/// §4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub kind: WebhookKind,
    pub payload_digest: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}
