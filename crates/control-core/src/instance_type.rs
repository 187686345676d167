use serde::{Deserialize, Serialize};

/// GPU spec (`gpu_model`, `gpu_count`, `gpu_memory_gb`) is immutable after
/// creation — enforced by the repository layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceType {
    pub provider: String,
    pub typename: String,
    pub vcpu: u32,
    pub memory_gb: u32,
    pub gpu_model: String,
    pub gpu_count: u32,
    pub gpu_memory_gb: u32,
    pub on_demand_price_per_hour: f64,
    pub spot_price_per_hour: Option<f64>,
    pub spot_supported: bool,
}
