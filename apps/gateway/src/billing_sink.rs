//! The concrete `BillingSink` wired into the exporter at boot: posts a
//! closed hourly bucket to the configured external billing provider as a
//! metered-usage event, keyed by `(tenant, hour, model)` so the provider's
//! own idempotent-delivery guard rejects a duplicate submission (§4.12).

use async_trait::async_trait;
use control_billing::{BillingError, BillingSink};
use control_core::usage::UsageHourly;
use reqwest::Client;
use tracing::warn;

pub struct HttpBillingSink {
    client: Client,
    export_url: Option<String>,
}

impl HttpBillingSink {
    pub fn new(client: Client, export_url: Option<String>) -> Self {
        Self { client, export_url }
    }
}

#[async_trait]
impl BillingSink for HttpBillingSink {
    async fn export(&self, bucket: &UsageHourly) -> Result<(), BillingError> {
        let Some(url) = &self.export_url else {
            warn!("no billing export URL configured, dropping bucket on the floor");
            return Ok(());
        };

        let idempotency_key = format!("{}:{}:{}", bucket.tenant_id, bucket.hour.to_rfc3339(), bucket.model_id);

        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", idempotency_key)
            .json(bucket)
            .send()
            .await
            .map_err(|e| BillingError::SinkRejected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::SinkRejected(format!(
                "billing provider responded with {}",
                response.status()
            )));
        }
        Ok(())
    }
}
