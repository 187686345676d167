use crate::errors::DbError;
use libsql::Connection;
use tracing::debug;

/// Idempotent DDL for every durable aggregate in §3, plus the indexes
/// named in §6: `(tenant, timestamp desc)` on usage, `(status)` on nodes,
/// `(prefix)` on keys, unique `(event_id)` on webhook events.
const TABLES: &[(&str, &str)] = &[
    ("tenants", r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            contact_email TEXT NOT NULL,
            billing_plan TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            deleted_at TEXT
        );
    "#),
    ("environments", r#"
        CREATE TABLE IF NOT EXISTS environments (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            name TEXT NOT NULL,
            default_region_id TEXT,
            UNIQUE(tenant_id, name)
        );
    "#),
    ("api_keys", r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            environment_id TEXT NOT NULL REFERENCES environments(id),
            secret_digest TEXT NOT NULL,
            prefix TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'active',
            rate_limit_rpm_override INTEGER,
            concurrency_override INTEGER,
            last_used_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(prefix);
    "#),
    ("models", r#"
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            canonical_name TEXT NOT NULL UNIQUE,
            family TEXT NOT NULL,
            size_label TEXT NOT NULL,
            kind TEXT NOT NULL,
            context_window INTEGER NOT NULL,
            required_memory_mb INTEGER NOT NULL,
            input_price_per_million REAL NOT NULL,
            output_price_per_million REAL NOT NULL,
            cached_input_price_per_million REAL,
            status TEXT NOT NULL DEFAULT 'active',
            scheduling_strategy TEXT NOT NULL DEFAULT 'least_loaded'
        );
    "#),
    ("regions", r#"
        CREATE TABLE IF NOT EXISTS regions (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            provider TEXT NOT NULL,
            available INTEGER NOT NULL DEFAULT 1,
            pricing_multiplier REAL NOT NULL DEFAULT 1.0
        );
    "#),
    ("instance_types", r#"
        CREATE TABLE IF NOT EXISTS instance_types (
            provider TEXT NOT NULL,
            typename TEXT NOT NULL,
            vcpu INTEGER NOT NULL,
            memory_gb INTEGER NOT NULL,
            gpu_model TEXT NOT NULL,
            gpu_count INTEGER NOT NULL,
            gpu_memory_gb INTEGER NOT NULL,
            on_demand_price_per_hour REAL NOT NULL,
            spot_price_per_hour REAL,
            spot_supported INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(provider, typename)
        );
    "#),
    ("nodes", r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            cluster_name TEXT NOT NULL UNIQUE,
            tenant_id TEXT,
            model_id TEXT NOT NULL,
            region_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            instance_typename TEXT NOT NULL,
            endpoint TEXT,
            spot INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'provisioning',
            health_score INTEGER NOT NULL DEFAULT 100,
            last_heartbeat_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes(status);
        CREATE INDEX IF NOT EXISTS idx_nodes_model ON nodes(model_id);
    "#),
    ("deployments", r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            model_name TEXT NOT NULL,
            min_replicas INTEGER NOT NULL,
            max_replicas INTEGER NOT NULL,
            current_replicas INTEGER NOT NULL DEFAULT 0,
            strategy TEXT NOT NULL DEFAULT 'spread',
            provider TEXT,
            region TEXT,
            gpu_type TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        );
    "#),
    ("usage_records", r#"
        CREATE TABLE IF NOT EXISTS usage_records (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            environment_id TEXT NOT NULL,
            api_key_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL,
            completion_tokens INTEGER NOT NULL,
            cached_tokens INTEGER NOT NULL,
            total_tokens INTEGER NOT NULL,
            latency_ms INTEGER NOT NULL,
            cost REAL NOT NULL,
            request_id TEXT NOT NULL,
            stream INTEGER NOT NULL DEFAULT 0,
            usage_missing INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_usage_tenant_ts ON usage_records(tenant_id, timestamp DESC);
    "#),
    ("usage_hourly", r#"
        CREATE TABLE IF NOT EXISTS usage_hourly (
            tenant_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            environment_id TEXT NOT NULL,
            hour TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            cached_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            request_count INTEGER NOT NULL DEFAULT 0,
            exported INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(tenant_id, model_id, environment_id, hour)
        );
    "#),
    ("webhook_events", r#"
        CREATE TABLE IF NOT EXISTS webhook_events (
            event_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload_digest TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
    "#),
];

pub async fn apply_schema(conn: &Connection) -> Result<(), DbError> {
    for (name, ddl) in TABLES {
        debug!("applying schema for {name}");
        for statement in ddl.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            conn.execute(statement, ())
                .await
                .map_err(|e| DbError::Query(e))?;
        }
    }
    Ok(())
}
