use crate::errors::DbError;
use control_core::webhook::{WebhookEvent, WebhookKind};
use libsql::{params, Connection};

pub struct WebhookEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> WebhookEventRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts a webhook event guarded by the unique constraint on
    /// `event_id`. Returns `Ok(false)` instead of an error on a duplicate
    /// delivery — the caller treats that as "already seen, ack and skip".
    pub async fn insert_if_new(&self, event: &WebhookEvent) -> Result<bool, DbError> {
        let result = self
            .conn
            .execute(
                "INSERT INTO webhook_events (event_id, kind, payload_digest, processed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.event_id.clone(),
                    kind_str(event.kind).to_string(),
                    event.payload_digest.clone(),
                    event.processed,
                    event.created_at.to_rfc3339(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().to_lowercase().contains("unique") => Ok(false),
            Err(e) => Err(DbError::Query(e)),
        }
    }

    pub async fn mark_processed(&self, event_id: &str) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE webhook_events SET processed = 1 WHERE event_id = ?1",
                params![event_id.to_string()],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, event_id: &str) -> Result<WebhookEvent, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT event_id, kind, payload_digest, processed, created_at
                 FROM webhook_events WHERE event_id = ?1",
                params![event_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_event(&row),
            None => Err(DbError::NotFound),
        }
    }
}

fn kind_str(kind: WebhookKind) -> &'static str {
    match kind {
        WebhookKind::SubscriptionUpdated => "subscription_updated",
        WebhookKind::InvoicePaid => "invoice_paid",
        WebhookKind::PaymentFailed => "payment_failed",
    }
}

fn row_to_event(row: &libsql::Row) -> Result<WebhookEvent, DbError> {
    let event_id: String = row.get(0)?;
    let kind_raw: String = row.get(1)?;
    let payload_digest: String = row.get(2)?;
    let processed: i64 = row.get(3)?;
    let created_at: String = row.get(4)?;

    let kind = match kind_raw.as_str() {
        "subscription_updated" => WebhookKind::SubscriptionUpdated,
        "invoice_paid" => WebhookKind::InvoicePaid,
        "payment_failed" => WebhookKind::PaymentFailed,
        other => return Err(DbError::Mapping(format!("unknown webhook kind: {other}"))),
    };

    Ok(WebhookEvent {
        event_id,
        kind,
        payload_digest,
        processed: processed != 0,
        created_at: super::parse_timestamp(&created_at),
    })
}
