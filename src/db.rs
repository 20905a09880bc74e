use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

// ============================================================================
// Database Setup
// ============================================================================
//
// Connection pool plus idempotent schema creation. Three tables: the order
// aggregate, its line items, and the transactional outbox that the relay
// drains.
//
// ============================================================================

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_order (
            purchase_order_id BIGSERIAL PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            order_at TIMESTAMPTZ NOT NULL,
            required_at DATE,
            expected_delivery_at TIMESTAMPTZ NOT NULL,
            received_at TIMESTAMPTZ,
            canceled_at TIMESTAMPTZ,
            factory_id BIGINT NOT NULL,
            factory_name TEXT NOT NULL,
            requester_name TEXT NOT NULL,
            urgency TEXT NOT NULL,
            expected_amount NUMERIC(19, 2) NOT NULL,
            deleted BOOLEAN NOT NULL DEFAULT FALSE,
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_order_item (
            purchase_order_item_id BIGSERIAL PRIMARY KEY,
            purchase_order_id BIGINT NOT NULL
                REFERENCES purchase_order (purchase_order_id),
            material_code TEXT NOT NULL,
            material_name TEXT NOT NULL,
            unit TEXT NOT NULL,
            quantity BIGINT NOT NULL,
            standard_quantity BIGINT,
            lead_time_days INT,
            unit_price NUMERIC(19, 2) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_outbox (
            purchase_outbox_id BIGSERIAL PRIMARY KEY,
            event_type TEXT NOT NULL,
            aggregate_id BIGINT NOT NULL,
            event_id UUID NOT NULL UNIQUE,
            payload JSONB NOT NULL,
            status TEXT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL,
            retry_count INT NOT NULL DEFAULT 0,
            last_error TEXT,
            published_at TIMESTAMPTZ,
            last_tried_at TIMESTAMPTZ,
            next_retry_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Covers the relay's READY / FAILED-due scan
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_purchase_outbox_pick
            ON purchase_outbox (status, occurred_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
