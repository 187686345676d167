use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub provider: String,
    pub available: bool,
    pub pricing_multiplier: f64,
}
