use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a `Tenant`. A tenant with `Deleted` status must
/// carry a `deleted_at` timestamp and have no active API keys — enforced
/// by `TenantRepository::soft_delete`, not by this type alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub display_name: String,
    pub contact_email: String,
    pub billing_plan: String,
    pub status: TenantStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(display_name: String, contact_email: String, billing_plan: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            contact_email,
            billing_plan,
            status: TenantStatus::Active,
            deleted_at: None,
        }
    }

    /// Invariant check used by the repository layer before persisting.
    pub fn is_well_formed(&self) -> bool {
        match self.status {
            TenantStatus::Deleted => self.deleted_at.is_some(),
            _ => self.deleted_at.is_none(),
        }
    }
}
