pub mod api_key;
pub mod deployment;
pub mod environment;
pub mod instance_type;
pub mod model;
pub mod node;
pub mod region;
pub mod tenant;
pub mod usage;
pub mod webhook;

pub use api_key::ApiKeyRepository;
pub use deployment::DeploymentRepository;
pub use environment::EnvironmentRepository;
pub use instance_type::InstanceTypeRepository;
pub use model::ModelRepository;
pub use node::NodeRepository;
pub use region::RegionRepository;
pub use tenant::TenantRepository;
pub use usage::UsageRepository;
pub use webhook::WebhookEventRepository;

use chrono::{DateTime, TimeZone, Utc};

/// Parses a stored RFC3339 timestamp, falling back to the Unix epoch if the
/// column is empty — used only for optional timestamp columns that may be
/// `NULL`.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}
