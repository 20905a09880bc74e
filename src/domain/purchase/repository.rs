use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::aggregate::PurchaseOrder;
use super::value_objects::{OrderItem, OrderStatus, UrgencyLevel};

// ============================================================================
// Purchase Order Repository
// ============================================================================
//
// Row-level persistence for the aggregate. Mutating calls run on the
// caller's transaction so the outbox insert can share it; reads go straight
// to the pool. Soft-deleted orders are filtered from every read except the
// order-code lookup, where historic codes must keep blocking reuse.
//
// ============================================================================

/// Greatest existing order code for a prefix, across deleted rows too.
pub async fn find_last_code(
    tx: &mut Transaction<'_, Postgres>,
    prefix: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT code FROM purchase_order WHERE code LIKE $1 || '%' ORDER BY code DESC LIMIT 1",
    )
    .bind(prefix)
    .fetch_optional(&mut **tx)
    .await
}

/// Insert the order and its items; returns the assigned surrogate id.
pub async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrder,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO purchase_order \
            (code, status, order_at, required_at, expected_delivery_at, received_at, \
             canceled_at, factory_id, factory_name, requester_name, urgency, \
             expected_amount, deleted, deleted_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING purchase_order_id",
    )
    .bind(&order.code)
    .bind(order.status.as_str())
    .bind(order.order_at)
    .bind(order.required_at)
    .bind(order.expected_delivery_at)
    .bind(order.received_at)
    .bind(order.canceled_at)
    .bind(order.factory_id)
    .bind(&order.factory_name)
    .bind(&order.requester_name)
    .bind(order.urgency.as_str())
    .bind(order.expected_amount)
    .bind(order.deleted)
    .bind(order.deleted_at)
    .fetch_one(&mut **tx)
    .await?;

    for item in &order.items {
        sqlx::query(
            "INSERT INTO purchase_order_item \
                (purchase_order_id, material_code, material_name, unit, quantity, \
                 standard_quantity, lead_time_days, unit_price) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(&item.material_code)
        .bind(&item.material_name)
        .bind(&item.unit)
        .bind(item.quantity)
        .bind(item.standard_quantity)
        .bind(item.lead_time_days)
        .bind(item.unit_price)
        .execute(&mut **tx)
        .await?;
    }

    Ok(id)
}

/// Load one live order with its items.
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<PurchaseOrder>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT purchase_order_id, code, status, order_at, required_at, \
                expected_delivery_at, received_at, canceled_at, factory_id, \
                factory_name, requester_name, urgency, expected_amount, \
                deleted, deleted_at \
         FROM purchase_order \
         WHERE purchase_order_id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut order = map_order_row(&row)?;
    order.items = fetch_items(pool, id).await?;
    Ok(Some(order))
}

/// Load one live order with a row lock, for mutation on this transaction.
pub async fn find_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<Option<PurchaseOrder>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT purchase_order_id, code, status, order_at, required_at, \
                expected_delivery_at, received_at, canceled_at, factory_id, \
                factory_name, requester_name, urgency, expected_amount, \
                deleted, deleted_at \
         FROM purchase_order \
         WHERE purchase_order_id = $1 AND deleted = FALSE \
         FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut order = map_order_row(&row)?;

    let item_rows = sqlx::query(
        "SELECT material_code, material_name, unit, quantity, \
                standard_quantity, lead_time_days, unit_price \
         FROM purchase_order_item \
         WHERE purchase_order_id = $1 \
         ORDER BY purchase_order_item_id",
    )
    .bind(id)
    .fetch_all(&mut **tx)
    .await?;

    order.items = item_rows.iter().map(map_item_row).collect::<Result<_, _>>()?;
    Ok(Some(order))
}

/// Persist a status transition (receive or cancel).
pub async fn update_transition(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrder,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE purchase_order \
         SET status = $2, received_at = $3, canceled_at = $4 \
         WHERE purchase_order_id = $1",
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.received_at)
    .bind(order.canceled_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Mark the row deleted; it persists for audit but leaves every read path.
pub async fn mark_deleted(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrder,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE purchase_order SET deleted = TRUE, deleted_at = $2 WHERE purchase_order_id = $1",
    )
    .bind(order.id)
    .bind(order.deleted_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Optional filters for the paged listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub urgency: Option<UrgencyLevel>,
    /// Matched case-insensitively against order code, material code and name
    pub query: Option<String>,
}

/// Paged search ordered by order date descending. Returns the page of orders
/// (items attached) and the total row count for the filter.
pub async fn search(
    pool: &PgPool,
    filter: &OrderFilter,
    page: i64,
    size: i64,
) -> Result<(Vec<PurchaseOrder>, i64), sqlx::Error> {
    let status = filter.status.map(|s| s.as_str());
    let urgency = filter.urgency.map(|u| u.as_str());
    let query = filter.query.as_deref();

    let rows = sqlx::query(
        "SELECT DISTINCT po.purchase_order_id, po.code, po.status, po.order_at, \
                po.required_at, po.expected_delivery_at, po.received_at, \
                po.canceled_at, po.factory_id, po.factory_name, po.requester_name, \
                po.urgency, po.expected_amount, po.deleted, po.deleted_at \
         FROM purchase_order po \
         LEFT JOIN purchase_order_item i ON i.purchase_order_id = po.purchase_order_id \
         WHERE po.deleted = FALSE \
           AND ($1::text IS NULL OR po.status = $1) \
           AND ($2::text IS NULL OR po.urgency = $2) \
           AND ($3::text IS NULL OR $3 = '' \
                OR lower(po.code) LIKE lower('%' || $3 || '%') \
                OR lower(i.material_code) LIKE lower('%' || $3 || '%') \
                OR lower(i.material_name) LIKE lower('%' || $3 || '%')) \
         ORDER BY po.order_at DESC \
         LIMIT $4 OFFSET $5",
    )
    .bind(status)
    .bind(urgency)
    .bind(query)
    .bind(size)
    .bind(page * size)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT po.purchase_order_id) \
         FROM purchase_order po \
         LEFT JOIN purchase_order_item i ON i.purchase_order_id = po.purchase_order_id \
         WHERE po.deleted = FALSE \
           AND ($1::text IS NULL OR po.status = $1) \
           AND ($2::text IS NULL OR po.urgency = $2) \
           AND ($3::text IS NULL OR $3 = '' \
                OR lower(po.code) LIKE lower('%' || $3 || '%') \
                OR lower(i.material_code) LIKE lower('%' || $3 || '%') \
                OR lower(i.material_name) LIKE lower('%' || $3 || '%'))",
    )
    .bind(status)
    .bind(urgency)
    .bind(query)
    .fetch_one(pool)
    .await?;

    let mut orders: Vec<PurchaseOrder> = rows
        .iter()
        .map(map_order_row)
        .collect::<Result<_, _>>()?;

    // One items query for the whole page, grouped by order id
    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    let mut items_by_order = fetch_items_for(pool, &ids).await?;
    for order in &mut orders {
        order.items = items_by_order.remove(&order.id).unwrap_or_default();
    }

    Ok((orders, total))
}

async fn fetch_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT material_code, material_name, unit, quantity, \
                standard_quantity, lead_time_days, unit_price \
         FROM purchase_order_item \
         WHERE purchase_order_id = $1 \
         ORDER BY purchase_order_item_id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_item_row).collect()
}

async fn fetch_items_for(
    pool: &PgPool,
    order_ids: &[i64],
) -> Result<HashMap<i64, Vec<OrderItem>>, sqlx::Error> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(
        "SELECT purchase_order_id, material_code, material_name, unit, quantity, \
                standard_quantity, lead_time_days, unit_price \
         FROM purchase_order_item \
         WHERE purchase_order_id = ANY($1) \
         ORDER BY purchase_order_item_id",
    )
    .bind(order_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let order_id: i64 = row.try_get("purchase_order_id")?;
        grouped.entry(order_id).or_default().push(map_item_row(row)?);
    }
    Ok(grouped)
}

fn map_order_row(row: &PgRow) -> Result<PurchaseOrder, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let urgency: String = row.try_get("urgency")?;
    let urgency: UrgencyLevel = urgency
        .parse()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(PurchaseOrder {
        id: row.try_get("purchase_order_id")?,
        code: row.try_get("code")?,
        status,
        order_at: row.try_get("order_at")?,
        required_at: row.try_get("required_at")?,
        expected_delivery_at: row.try_get("expected_delivery_at")?,
        received_at: row.try_get("received_at")?,
        canceled_at: row.try_get("canceled_at")?,
        factory_id: row.try_get("factory_id")?,
        factory_name: row.try_get("factory_name")?,
        requester_name: row.try_get("requester_name")?,
        urgency,
        expected_amount: row.try_get("expected_amount")?,
        deleted: row.try_get("deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        items: Vec::new(),
    })
}

fn map_item_row(row: &PgRow) -> Result<OrderItem, sqlx::Error> {
    Ok(OrderItem {
        material_code: row.try_get("material_code")?,
        material_name: row.try_get("material_name")?,
        unit: row.try_get("unit")?,
        quantity: row.try_get("quantity")?,
        standard_quantity: row.try_get("standard_quantity")?,
        lead_time_days: row.try_get("lead_time_days")?,
        unit_price: row.try_get("unit_price")?,
    })
}
