use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

// ============================================================================
// Purchase Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid unit price: {0}")]
    InvalidUnitPrice(Decimal),

    #[error("Purchase order not found: {0}")]
    NotFound(i64),

    #[error("Order is already processed (status: {0})")]
    AlreadyProcessed(OrderStatus),

    #[error("Could not allocate a unique order code")]
    CodeExhausted,

    #[error("Failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
