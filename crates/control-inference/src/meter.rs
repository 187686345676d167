use chrono::Utc;
use control_core::usage::UsageRecord;
use control_db::repositories::UsageRepository;
use control_db::DbClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{error, info, instrument};
use uuid::Uuid;

const RING_BUFFER_CAPACITY: usize = 10_000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Identifies the request a usage record belongs to, threaded through the
/// proxy call so the meter doesn't need to re-derive tenant/key/model
/// context from the wire format.
#[derive(Debug, Clone)]
pub struct UsageContext {
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub api_key_id: Uuid,
    pub model_id: Uuid,
    pub node_id: Uuid,
    pub request_id: Uuid,
    pub stream: bool,
    pub started_at: chrono::DateTime<Utc>,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub cached_input_price_per_million: Option<f64>,
    pub region_pricing_multiplier: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
}

impl ExtractedUsage {
    /// Parses a standard OpenAI `usage` object out of a buffered
    /// non-streaming response body.
    pub fn from_json_body(body: &Value) -> Option<Self> {
        let usage = body.get("usage")?;
        Some(Self {
            prompt_tokens: usage.get("prompt_tokens")?.as_u64().unwrap_or(0),
            completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
            cached_tokens: usage
                .get("prompt_tokens_details")
                .and_then(|d| d.get("cached_tokens"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    /// Resolves the Open Question on streaming usage accounting: only the
    /// final SSE event (the one carrying the OpenAI `usage` field when
    /// `stream_options.include_usage` is set) is trusted. A streamed
    /// response with no such event records `usage_missing` instead of
    /// guessing from token counts off partial deltas.
    pub fn from_sse_buffer(buffer: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(buffer).ok()?;
        text.lines()
            .rev()
            .filter_map(|line| line.strip_prefix("data: "))
            .filter(|payload| *payload != "[DONE]")
            .find_map(|payload| {
                let value: Value = serde_json::from_str(payload).ok()?;
                Self::from_json_body(&value)
            })
    }
}

/// Buffers completed-request usage in a bounded ring and flushes it to the
/// persistent store on a fixed interval, so the inference hot path never
/// blocks on a database write (§4.5, §9).
#[derive(Clone)]
pub struct UsageMeter {
    buffer: Arc<Mutex<Vec<UsageRecord>>>,
    db: DbClient,
}

impl UsageMeter {
    pub fn new(db: DbClient) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::with_capacity(RING_BUFFER_CAPACITY))),
            db,
        }
    }

    pub async fn record_buffered(&self, context: UsageContext, usage: ExtractedUsage) {
        self.push(self.to_record(context, Some(usage))).await;
    }

    pub async fn record_streamed(&self, context: UsageContext, usage: ExtractedUsage) {
        self.push(self.to_record(context, Some(usage))).await;
    }

    pub async fn record_missing(&self, context: UsageContext) {
        self.push(self.to_record(context, None)).await;
    }

    fn to_record(&self, context: UsageContext, usage: Option<ExtractedUsage>) -> UsageRecord {
        let usage = usage.unwrap_or_default();
        let cost = control_billing::pricing::compute_cost(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.cached_tokens,
            context.input_price_per_million,
            context.output_price_per_million,
            context.cached_input_price_per_million,
            context.region_pricing_multiplier,
        );
        let latency_ms = (Utc::now() - context.started_at).num_milliseconds().max(0) as u64;

        UsageRecord {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            environment_id: context.environment_id,
            api_key_id: context.api_key_id,
            model_id: context.model_id,
            node_id: context.node_id,
            timestamp: Utc::now(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_tokens: usage.cached_tokens,
            total_tokens: usage.prompt_tokens + usage.completion_tokens,
            latency_ms,
            cost,
            request_id: context.request_id,
            stream: context.stream,
            usage_missing: usage.prompt_tokens == 0 && usage.completion_tokens == 0,
        }
    }

    async fn push(&self, record: UsageRecord) {
        let mut buffer = self.buffer.lock().await;
        if buffer.len() >= RING_BUFFER_CAPACITY {
            error!(
                "usage ring buffer overflowed at {} records, oldest record dropped",
                RING_BUFFER_CAPACITY
            );
            buffer.remove(0);
        }
        buffer.push(record);
    }

    /// Spawns the periodic flush daemon. Runs independently of request
    /// handling so a slow database never backs up the inference path.
    pub fn spawn_flush_loop(self) {
        tokio::spawn(async move {
            let mut ticker = interval(FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                self.flush_once().await;
            }
        });
    }

    #[instrument(skip(self))]
    async fn flush_once(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            return;
        }

        let conn = match self.db.connection() {
            Ok(c) => c,
            Err(e) => {
                error!("could not obtain a store connection to flush usage: {e}");
                self.requeue(batch).await;
                return;
            }
        };

        if let Err(e) = UsageRepository::new(&conn).insert_batch(&batch).await {
            error!("usage flush failed, re-queueing {} records: {e}", batch.len());
            self.requeue(batch).await;
        } else {
            info!("flushed {} usage records", batch.len());
        }
    }

    async fn requeue(&self, mut batch: Vec<UsageRecord>) {
        let mut buffer = self.buffer.lock().await;
        batch.append(&mut buffer);
        *buffer = batch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_usage_from_standard_openai_body() {
        let body = serde_json::json!({
            "choices": [],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        });
        let usage = ExtractedUsage::from_json_body(&body).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
    }

    #[test]
    fn extracts_usage_from_final_sse_event_only() {
        let buffer = b"data: {\"choices\":[{\"delta\":{}}]}\n\ndata: {\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":7}}\n\ndata: [DONE]\n\n";
        let usage = ExtractedUsage::from_sse_buffer(buffer).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 7);
    }

    #[test]
    fn missing_sse_usage_event_returns_none() {
        let buffer = b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        assert!(ExtractedUsage::from_sse_buffer(buffer).is_none());
    }

    #[tokio::test]
    async fn cost_combines_prompt_and_completion_pricing_with_region_multiplier() {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let meter = UsageMeter::new(db);
        let context = UsageContext {
            tenant_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            node_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            stream: false,
            started_at: Utc::now(),
            input_price_per_million: 2.0,
            output_price_per_million: 4.0,
            cached_input_price_per_million: None,
            region_pricing_multiplier: 1.5,
        };
        let usage = ExtractedUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
            cached_tokens: 0,
        };
        let record = meter.to_record(context, Some(usage));
        assert!((record.cost - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cost_applies_the_cached_token_discount() {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let meter = UsageMeter::new(db);
        let context = UsageContext {
            tenant_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            node_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            stream: false,
            started_at: Utc::now(),
            input_price_per_million: 2.0,
            output_price_per_million: 0.0,
            cached_input_price_per_million: Some(0.5),
            region_pricing_multiplier: 1.0,
        };
        let usage = ExtractedUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 0,
            cached_tokens: 400_000,
        };
        let record = meter.to_record(context, Some(usage));
        // 600k uncached @ $2/M + 400k cached @ $0.5/M = 1.2 + 0.2
        assert!((record.cost - 1.4).abs() < 1e-9);
    }
}
