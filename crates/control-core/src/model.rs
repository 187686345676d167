use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Chat,
    Completion,
    Embedding,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Active,
    Retired,
}

/// A servable model. `kind` and `required_memory_mb` are immutable after
/// creation — enforced by `ModelRepository::update` rejecting those
/// fields, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub canonical_name: String,
    pub family: String,
    pub size_label: String,
    pub kind: ModelKind,
    pub context_window: u32,
    pub required_memory_mb: u32,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub cached_input_price_per_million: Option<f64>,
    pub status: ModelStatus,
    pub scheduling_strategy: SchedulingStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    LeastLoaded,
    RoundRobin,
    Weighted,
    Random,
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::LeastLoaded
    }
}
