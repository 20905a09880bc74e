use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::outbox::{enqueue_tx, PurchaseEventType};

use super::aggregate::{code_prefix, next_code, NewPurchaseOrder, PurchaseOrder};
use super::errors::PurchaseError;
use super::repository::{self, OrderFilter};
use super::value_objects::{OrderItem, OrderStatus, UrgencyLevel};

// ============================================================================
// Purchase Service - Use Cases
// ============================================================================
//
// The contract the HTTP layer consumes: create, receive, cancel, delete,
// plus the read side. Every mutation runs one transaction that covers both
// the aggregate write and its outbox insert; commit makes them durable
// together, and any error before commit rolls both back.
//
// ============================================================================

/// Attempts before giving up on a unique order code. Collisions only happen
/// when two creations race for the same daily sequence number.
const CODE_INSERT_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct PurchaseService {
    pool: PgPool,
}

impl PurchaseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Place a new material order: validate, derive code/urgency/amount,
    /// persist the order with its items and stage PurchaseOrderCreated, all
    /// in one transaction. Retries the whole insert when the generated code
    /// loses a race on the unique constraint.
    pub async fn create_order(
        &self,
        request: NewPurchaseOrder,
    ) -> Result<PurchaseOrderView, PurchaseError> {
        // Invalid requests never reach the database
        PurchaseOrder::validate(&request)?;

        for attempt in 1..=CODE_INSERT_ATTEMPTS {
            let mut tx = self.pool.begin().await?;

            let prefix = code_prefix(Utc::now().date_naive());
            let last_code = repository::find_last_code(&mut tx, &prefix).await?;
            let code = next_code(&prefix, last_code.as_deref());

            let mut order = PurchaseOrder::create(code, request.clone())?;

            match repository::insert_order(&mut tx, &order).await {
                Ok(id) => {
                    order.id = id;
                    enqueue_tx(&mut tx, PurchaseEventType::Created, &order, false).await?;
                    tx.commit().await?;

                    tracing::info!(
                        order_id = order.id,
                        code = %order.code,
                        factory_id = order.factory_id,
                        expected_amount = %order.expected_amount,
                        "Purchase order created"
                    );
                    return Ok(PurchaseOrderView::from(order));
                }
                Err(e) if is_code_collision(&e) => {
                    // Dropping the transaction rolls it back
                    tracing::warn!(
                        attempt,
                        code = %order.code,
                        "Order code collision, regenerating"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PurchaseError::CodeExhausted)
    }

    /// Mark an order received and stage PurchaseOrderReceived.
    pub async fn receive_order(&self, id: i64) -> Result<PurchaseOrderView, PurchaseError> {
        self.transition(id, PurchaseEventType::Received, |order| order.receive())
            .await
    }

    /// Cancel an order and stage PurchaseOrderCanceled.
    pub async fn cancel_order(&self, id: i64) -> Result<PurchaseOrderView, PurchaseError> {
        self.transition(id, PurchaseEventType::Canceled, |order| order.cancel())
            .await
    }

    async fn transition(
        &self,
        id: i64,
        event_type: PurchaseEventType,
        apply: impl FnOnce(&mut PurchaseOrder) -> Result<(), PurchaseError>,
    ) -> Result<PurchaseOrderView, PurchaseError> {
        let mut tx = self.pool.begin().await?;

        let mut order = repository::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or(PurchaseError::NotFound(id))?;

        apply(&mut order)?;
        repository::update_transition(&mut tx, &order).await?;
        enqueue_tx(&mut tx, event_type, &order, false).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            code = %order.code,
            status = %order.status,
            event_type = %event_type,
            "Purchase order transitioned"
        );
        Ok(PurchaseOrderView::from(order))
    }

    /// Soft-delete an order and stage PurchaseOrderDeleted. The payload
    /// carries the deleted flag; the row stays behind for audit.
    pub async fn delete_order(&self, id: i64) -> Result<(), PurchaseError> {
        let mut tx = self.pool.begin().await?;

        let mut order = repository::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or(PurchaseError::NotFound(id))?;

        order.soft_delete();
        enqueue_tx(&mut tx, PurchaseEventType::Deleted, &order, true).await?;
        repository::mark_deleted(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::info!(order_id = id, code = %order.code, "Purchase order deleted");
        Ok(())
    }

    /// Single order projection, excluding soft-deleted rows.
    pub async fn get_order(&self, id: i64) -> Result<PurchaseOrderView, PurchaseError> {
        let order = repository::find_by_id(&self.pool, id)
            .await?
            .ok_or(PurchaseError::NotFound(id))?;
        Ok(PurchaseOrderView::from(order))
    }

    /// Paged, filtered listing ordered by order date descending.
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        page: i64,
        size: i64,
    ) -> Result<PageResponse<PurchaseOrderView>, PurchaseError> {
        let size = size.max(1);
        let (orders, total_elements) = repository::search(&self.pool, &filter, page, size).await?;

        Ok(PageResponse {
            content: orders.into_iter().map(PurchaseOrderView::from).collect(),
            total_elements,
            total_pages: (total_elements + size - 1) / size,
        })
    }
}

fn is_code_collision(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint() == Some("purchase_order_code_key")
        }
        _ => false,
    }
}

// ============================================================================
// Projections
// ============================================================================

/// The order projection returned to callers, mirroring the aggregate plus
/// its items at the time of the call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderView {
    pub id: i64,
    pub order_code: String,
    pub order_at: DateTime<Utc>,
    pub required_at: Option<NaiveDate>,
    pub expected_delivery_at: DateTime<Utc>,
    pub factory_id: i64,
    pub factory_name: String,
    pub requester_name: String,
    pub urgency: UrgencyLevel,
    pub expected_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

impl From<PurchaseOrder> for PurchaseOrderView {
    fn from(order: PurchaseOrder) -> Self {
        Self {
            id: order.id,
            order_code: order.code,
            order_at: order.order_at,
            required_at: order.required_at,
            expected_delivery_at: order.expected_delivery_at,
            factory_id: order.factory_id,
            factory_name: order.factory_name,
            requester_name: order.requester_name,
            urgency: order.urgency,
            expected_amount: order.expected_amount,
            status: order.status,
            items: order.items,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub total_elements: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_mirrors_aggregate() {
        let order = PurchaseOrder::create(
            "PR-250602-007".to_string(),
            NewPurchaseOrder {
                factory_id: 3,
                factory_name: "Busan Plant".to_string(),
                required_at: None,
                requester_name: "J. Lee".to_string(),
                items: vec![OrderItem {
                    material_code: "MAT-009".to_string(),
                    material_name: "Copper wire".to_string(),
                    unit: "M".to_string(),
                    quantity: 4,
                    standard_quantity: Some(2),
                    lead_time_days: Some(1),
                    unit_price: "2.50".parse().unwrap(),
                }],
            },
        )
        .unwrap();

        let view = PurchaseOrderView::from(order);
        assert_eq!(view.order_code, "PR-250602-007");
        assert_eq!(view.status, OrderStatus::Ordered);
        assert_eq!(view.expected_amount, "10.00".parse().unwrap());
        // ceil(4 / 2) * 1 day
        assert_eq!((view.expected_delivery_at - view.order_at).num_days(), 2);
        assert_eq!(view.items.len(), 1);
    }
}
