use crate::circuit_breaker::CircuitBreakerTable;
use crate::errors::InferenceError;
use crate::meter::{ExtractedUsage, UsageMeter};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use rand::Rng;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Hop-by-hop headers that must never be forwarded between the gateway
/// and an upstream worker (RFC 7230 §6.1), plus `host` which must be
/// re-derived for the new destination.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);
const BACKOFF_FACTOR: u32 = 2;
const STREAM_FLUSH_CHUNK: usize = 4096;

/// Forwards OpenAI-compatible requests to a chosen worker node, retrying
/// transient failures with jittered exponential backoff and tracking
/// outcomes through the circuit breaker table (§4.5, §4.6).
pub struct InferenceProxy {
    client: Client,
    breakers: CircuitBreakerTable,
}

impl InferenceProxy {
    pub fn new(breakers: CircuitBreakerTable) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client with valid TLS config");
        Self { client, breakers }
    }

    /// Forwards a non-streaming request. Retries up to `MAX_ATTEMPTS`
    /// times on connection-level failures and 5xx responses; a successful
    /// response (including 4xx from the worker, which is a client error,
    /// not a worker fault) short-circuits the loop.
    #[instrument(skip(self, body, headers))]
    pub async fn forward(
        &self,
        node_id: Uuid,
        endpoint: &str,
        path: &str,
        body: Bytes,
        headers: Vec<(String, String)>,
    ) -> Result<Response, InferenceError> {
        if !self.breakers.allow_request(node_id) {
            return Err(InferenceError::BreakerOpen(node_id));
        }

        let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let mut request = self.client.post(&url).body(body.clone());
            for (name, value) in filtered_headers(&headers) {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    warn!(%node_id, status = %response.status(), attempt, "upstream returned server error");
                    last_err = Some(InferenceError::Upstream(
                        response.error_for_status().unwrap_err(),
                    ));
                    self.breakers.record_failure(node_id);
                }
                Ok(response) => {
                    self.breakers.record_success(node_id);
                    return Ok(response);
                }
                Err(e) if e.is_timeout() => {
                    warn!(%node_id, attempt, "upstream request timed out");
                    self.breakers.record_failure(node_id);
                    last_err = Some(InferenceError::UpstreamTimeout);
                }
                Err(e) => {
                    warn!(%node_id, attempt, error = %e, "upstream request failed");
                    self.breakers.record_failure(node_id);
                    last_err = Some(InferenceError::Upstream(e));
                }
            }
        }

        Err(last_err.unwrap_or(InferenceError::UpstreamTimeout))
    }

    /// Streams an SSE response body chunk-by-chunk to the caller while
    /// tee-ing each chunk into `meter` for usage extraction from the
    /// trailing `data: [DONE]`-adjacent usage event (§4.5, §9 open
    /// question resolution: stream-final usage event only). Flushes to the
    /// caller in pieces no larger than `STREAM_FLUSH_CHUNK` bytes so a
    /// single huge upstream write never stalls the client connection.
    pub fn relay_stream(
        response: Response,
        meter: UsageMeter,
        context: crate::meter::UsageContext,
    ) -> impl Stream<Item = Result<Bytes, InferenceError>> {
        let mut upstream = response.bytes_stream();
        let mut tee_buffer: Vec<u8> = Vec::new();

        async_stream::stream! {
            while let Some(chunk) = upstream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(InferenceError::Upstream(e));
                        return;
                    }
                };

                tee_buffer.extend_from_slice(&chunk);

                let mut offset = 0;
                while offset < chunk.len() {
                    let end = (offset + STREAM_FLUSH_CHUNK).min(chunk.len());
                    yield Ok(Bytes::copy_from_slice(&chunk[offset..end]));
                    offset = end;
                }
            }

            if let Some(usage) = ExtractedUsage::from_sse_buffer(&tee_buffer) {
                meter.record_streamed(context, usage).await;
            } else {
                meter.record_missing(context).await;
            }
        }
    }
}

fn filtered_headers(headers: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    headers.iter().filter_map(|(name, value)| {
        let lower = name.to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&lower.as_str()) {
            None
        } else {
            Some((name.as_str(), value.as_str()))
        }
    })
}

/// Exponential backoff with base 200ms, factor 2, and +/-20% jitter,
/// capped at `MAX_ATTEMPTS` attempts (§4.5).
fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_BACKOFF.as_millis() as u64 * BACKOFF_FACTOR.pow(attempt - 1) as u64;
    let jitter_range = (base as f64 * 0.2) as i64;
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    Duration::from_millis((base as i64 + jitter).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_headers_strips_hop_by_hop() {
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Host".to_string(), "internal.local".to_string()),
        ];
        let kept: Vec<_> = filtered_headers(&headers).collect();
        assert_eq!(kept, vec![("Content-Type", "application/json")]);
    }

    #[test]
    fn backoff_delay_grows_with_attempt() {
        let first = backoff_delay(1).as_millis();
        let second = backoff_delay(2).as_millis();
        assert!(first < 300);
        assert!(second > first / 2);
    }
}
