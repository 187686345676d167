use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named scope within a tenant (e.g. `prod`, `staging`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub default_region_id: Option<Uuid>,
}

impl Environment {
    pub fn new(tenant_id: Uuid, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            default_region_id: None,
        }
    }
}
