use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::purchase::{PurchaseError, PurchaseOrder};

use super::event::{PurchaseEvent, PurchaseEventType};
use super::record::{OutboxRecord, OutboxStatus};

// ============================================================================
// Outbox Store
// ============================================================================
//
// Durable staging table for events awaiting delivery. Two distinct writers:
// use-case transactions insert READY rows via `enqueue_tx`, and the relay
// moves rows through their status transitions via `save`. Nothing deletes
// rows.
//
// ============================================================================

/// Stage an event for `order` on the caller's transaction.
///
/// Builds the envelope from the aggregate snapshot, assigns a fresh event id,
/// and inserts the READY row. A serialization failure propagates to the
/// caller before commit, so the aggregate mutation rolls back with it - the
/// state change and its event are atomic in both directions.
pub async fn enqueue_tx(
    tx: &mut Transaction<'_, Postgres>,
    event_type: PurchaseEventType,
    order: &PurchaseOrder,
    deleted: bool,
) -> Result<Uuid, PurchaseError> {
    let event = PurchaseEvent::from_order(event_type, order, deleted);
    let payload = serde_json::to_value(&event)?;

    sqlx::query(
        "INSERT INTO purchase_outbox \
            (event_type, aggregate_id, event_id, payload, status, occurred_at, retry_count) \
         VALUES ($1, $2, $3, $4, $5, $6, 0)",
    )
    .bind(event_type.as_str())
    .bind(order.id)
    .bind(event.event_id)
    .bind(&payload)
    .bind(OutboxStatus::Ready.as_str())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        event_id = %event.event_id,
        event_type = %event_type,
        aggregate_id = order.id,
        "Staged outbox event"
    );

    Ok(event.event_id)
}

/// Relay-facing storage surface. The relay only ever selects deliverable
/// rows and persists their transitions; anything else stays on the concrete
/// store.
#[async_trait]
pub trait OutboxStorage: Send + Sync {
    /// Select the next batch of deliverable rows, oldest first: READY rows,
    /// plus FAILED rows whose retry is due and whose budget is not spent.
    /// DEAD and PUBLISHED rows are never returned.
    async fn pick_ready_batch(
        &self,
        batch_size: i64,
        max_retry: i32,
    ) -> Result<Vec<OutboxRecord>, sqlx::Error>;

    /// Persist a record's in-memory transition. All relay-owned columns are
    /// written from the record so the persisted retry count always matches
    /// the value the dispatch decision was made on.
    async fn save(&self, record: &OutboxRecord) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct OutboxStore {
    pool: PgPool,
}

impl OutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStorage for OutboxStore {
    async fn pick_ready_batch(
        &self,
        batch_size: i64,
        max_retry: i32,
    ) -> Result<Vec<OutboxRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT purchase_outbox_id, event_type, aggregate_id, event_id, payload, \
                    status, occurred_at, retry_count, last_error, \
                    published_at, last_tried_at, next_retry_at \
             FROM purchase_outbox \
             WHERE status = 'READY' \
                OR (status = 'FAILED' AND next_retry_at <= now() AND retry_count < $1) \
             ORDER BY occurred_at ASC \
             LIMIT $2",
        )
        .bind(max_retry)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_record).collect()
    }

    async fn save(&self, record: &OutboxRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE purchase_outbox \
             SET status = $2, retry_count = $3, last_error = $4, \
                 published_at = $5, last_tried_at = $6, next_retry_at = $7 \
             WHERE purchase_outbox_id = $1",
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.retry_count)
        .bind(record.last_error.as_deref())
        .bind(record.published_at)
        .bind(record.last_tried_at)
        .bind(record.next_retry_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl OutboxStore {
    /// DEAD rows awaiting operator intervention, oldest first.
    pub async fn dead_letters(&self, limit: i64) -> Result<Vec<OutboxRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT purchase_outbox_id, event_type, aggregate_id, event_id, payload, \
                    status, occurred_at, retry_count, last_error, \
                    published_at, last_tried_at, next_retry_at \
             FROM purchase_outbox \
             WHERE status = 'DEAD' \
             ORDER BY occurred_at ASC \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_record).collect()
    }
}

fn map_record(row: &PgRow) -> Result<OutboxRecord, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(OutboxRecord {
        id: row.try_get("purchase_outbox_id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_id: row.try_get("event_id")?,
        payload: row.try_get("payload")?,
        status,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
        published_at: row.try_get("published_at")?,
        last_tried_at: row.try_get("last_tried_at")?,
        next_retry_at: row.try_get("next_retry_at")?,
    })
}
