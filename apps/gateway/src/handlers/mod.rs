pub mod admin;
pub mod api_keys;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod usage;
pub mod webhooks;
pub mod worker;
