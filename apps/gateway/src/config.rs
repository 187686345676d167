//! Typed settings read once at boot from the process environment, matching
//! the teacher's direct `env::var(...).unwrap_or_else(...)` idiom rather than
//! a config-file format this workspace doesn't otherwise use.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub database_token: Option<String>,
    pub server_port: u16,
    pub admin_token: String,
    pub worker_auth_token: String,
    pub orchestrator_binary_path: String,
    pub default_provider: String,
    pub default_region_code: String,
    pub billing_webhook_secret: String,
    pub billing_export_url: Option<String>,
    pub global_rpm_limit: u64,
    pub tenant_rpm_limit: u64,
    pub environment_rpm_limit: u64,
    pub key_rpm_limit: u64,
}

impl Settings {
    /// Loads configuration from the environment. Panics on a missing
    /// required secret — an unrecoverable initialization failure the
    /// process should exit non-zero for, not limp forward from (§6).
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| ":memory:".to_string()),
            database_token: env::var("DATABASE_AUTH_TOKEN").ok(),
            server_port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            admin_token: env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set"),
            worker_auth_token: env::var("WORKER_AUTH_TOKEN").expect("WORKER_AUTH_TOKEN must be set"),
            orchestrator_binary_path: env::var("ORCHESTRATOR_CLI_PATH")
                .unwrap_or_else(|_| "orchestrator-cli".to_string()),
            default_provider: env::var("DEFAULT_PROVIDER").unwrap_or_else(|_| "aws".to_string()),
            default_region_code: env::var("DEFAULT_REGION_CODE").unwrap_or_else(|_| "us-east-1".to_string()),
            billing_webhook_secret: env::var("BILLING_WEBHOOK_SECRET").unwrap_or_default(),
            billing_export_url: env::var("BILLING_EXPORT_URL").ok(),
            global_rpm_limit: parse_or(env::var("GLOBAL_RPM_LIMIT").ok(), 100_000),
            tenant_rpm_limit: parse_or(env::var("TENANT_RPM_LIMIT").ok(), 6_000),
            environment_rpm_limit: parse_or(env::var("ENVIRONMENT_RPM_LIMIT").ok(), 6_000),
            key_rpm_limit: parse_or(env::var("KEY_RPM_LIMIT").ok(), 60),
        }
    }
}

fn parse_or(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}
