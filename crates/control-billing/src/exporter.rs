use crate::errors::BillingError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use control_core::usage::UsageHourly;
use control_db::repositories::UsageRepository;
use control_db::DbClient;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::interval;
use tracing::{error, info, instrument};

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(300);

/// Destination for exported usage rollups — an external billing provider
/// in production, an in-memory recorder in tests. Kept as a trait so the
/// exporter's idempotency logic can be tested without a network call
/// (§4.12).
#[async_trait]
pub trait BillingSink: Send + Sync {
    async fn export(&self, bucket: &UsageHourly) -> Result<(), BillingError>;
}

/// Folds the current hour's usage records into `usage_hourly`, then pushes
/// every not-yet-exported bucket to the sink and marks it exported only
/// after the sink call succeeds — an outbox delivery pattern that
/// tolerates the process dying between aggregation and export without
/// double-billing or losing a bucket (§4.12, §8).
pub fn spawn_billing_exporter(db: DbClient, sink: Arc<dyn BillingSink>) {
    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        info!("billing exporter started, running every {:?}", POLL_INTERVAL);

        loop {
            ticker.tick().await;
            if let Err(e) = run_once(&db, sink.as_ref()).await {
                error!("billing export pass failed: {e}");
            }
        }
    });
}

#[instrument(skip(db, sink))]
async fn run_once(db: &DbClient, sink: &dyn BillingSink) -> Result<(), BillingError> {
    let conn = db.connection()?;
    let repo = UsageRepository::new(&conn);

    let closed_hour = floor_to_previous_closed_hour(Utc::now());
    let bucketed = repo.aggregate_hour(closed_hour).await?;
    if bucketed > 0 {
        info!(closed_hour = %closed_hour, buckets = bucketed, "aggregated hourly usage");
    }

    let pending = repo.list_unexported_hourly().await?;
    for bucket in pending {
        match sink.export(&bucket).await {
            Ok(()) => {
                repo.mark_exported(bucket.tenant_id, bucket.model_id, bucket.environment_id, bucket.hour)
                    .await?;
            }
            Err(e) => {
                error!(
                    tenant_id = %bucket.tenant_id, hour = %bucket.hour,
                    "export failed for bucket, will retry next pass: {e}"
                );
            }
        }
    }

    Ok(())
}

/// Only hours that have fully elapsed are safe to aggregate — the current,
/// still-filling hour is left alone so a late-arriving request within it
/// isn't silently dropped from the rollup.
fn floor_to_previous_closed_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let current_hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    current_hour_start - Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::Mutex;

    struct RecordingSink {
        exported: Mutex<Vec<UsageHourly>>,
    }

    #[async_trait]
    impl BillingSink for RecordingSink {
        async fn export(&self, bucket: &UsageHourly) -> Result<(), BillingError> {
            self.exported.lock().await.push(bucket.clone());
            Ok(())
        }
    }

    #[test]
    fn floors_to_the_previous_fully_elapsed_hour() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 14, 37, 0).unwrap();
        let floored = floor_to_previous_closed_hour(now);
        assert_eq!(floored, Utc.with_ymd_and_hms(2026, 1, 1, 13, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn export_marks_bucket_exported_only_on_sink_success() {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let conn = db.connection().unwrap();
        let repo = UsageRepository::new(&conn);

        let tenant_id = uuid::Uuid::new_v4();
        let environment_id = uuid::Uuid::new_v4();
        let api_key_id = uuid::Uuid::new_v4();
        let model_id = uuid::Uuid::new_v4();
        let node_id = uuid::Uuid::new_v4();
        let hour_start = Utc.with_ymd_and_hms(2026, 1, 1, 13, 0, 0).unwrap();

        let record = control_core::usage::UsageRecord {
            id: uuid::Uuid::new_v4(),
            tenant_id,
            environment_id,
            api_key_id,
            model_id,
            node_id,
            timestamp: hour_start + Duration::minutes(5),
            prompt_tokens: 100,
            completion_tokens: 50,
            cached_tokens: 0,
            total_tokens: 150,
            latency_ms: 200,
            cost: 0.01,
            request_id: uuid::Uuid::new_v4(),
            stream: false,
            usage_missing: false,
        };
        repo.insert_batch(&[record]).await.unwrap();
        repo.aggregate_hour(hour_start).await.unwrap();

        let sink = Arc::new(RecordingSink { exported: Mutex::new(Vec::new()) });
        run_once_at(&db, sink.as_ref(), hour_start).await.unwrap();

        assert_eq!(sink.exported.lock().await.len(), 1);
        let remaining = repo.list_unexported_hourly().await.unwrap();
        assert!(remaining.is_empty());
    }

    /// Test-only variant of `run_once` that aggregates a fixed hour instead
    /// of "now minus one hour", so the assertion isn't racing wall-clock
    /// time.
    async fn run_once_at(db: &DbClient, sink: &dyn BillingSink, hour: DateTime<Utc>) -> Result<(), BillingError> {
        let conn = db.connection()?;
        let repo = UsageRepository::new(&conn);
        repo.aggregate_hour(hour).await?;
        for bucket in repo.list_unexported_hourly().await? {
            sink.export(&bucket).await?;
            repo.mark_exported(bucket.tenant_id, bucket.model_id, bucket.environment_id, bucket.hour)
                .await?;
        }
        Ok(())
    }
}
