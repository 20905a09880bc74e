use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::PurchaseError;
use super::value_objects::{OrderItem, OrderStatus, UrgencyLevel};

// ============================================================================
// Purchase Order Aggregate - Domain Logic
// ============================================================================
//
// The order and its line items form one consistency boundary. The aggregate
// always carries its materialized items, so a snapshot of it is exactly what
// the outbox enqueuer needs - there is no lazy relation to re-attach.
//
// Status transitions are one-way: ORDERED -> RECEIVED or ORDERED -> CANCELED,
// both terminal. Soft deletion is orthogonal to status.
//
// ============================================================================

/// Input for order creation, as the HTTP layer would hand it over.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseOrder {
    pub factory_id: i64,
    pub factory_name: String,
    pub required_at: Option<NaiveDate>,
    pub requester_name: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrder {
    /// Surrogate id; 0 until the row is inserted.
    pub id: i64,
    pub code: String,
    pub status: OrderStatus,
    pub order_at: DateTime<Utc>,
    pub required_at: Option<NaiveDate>,
    /// Order date plus the longest per-item calculated lead time
    pub expected_delivery_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub factory_id: i64,
    pub factory_name: String,
    pub requester_name: String,
    pub urgency: UrgencyLevel,
    pub expected_amount: Decimal,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl PurchaseOrder {
    /// Check a creation request without building anything. `create` runs the
    /// same checks; callers that open a transaction first can reject here
    /// instead.
    pub fn validate(request: &NewPurchaseOrder) -> Result<(), PurchaseError> {
        validate_items(&request.items)
    }

    /// Create a new order in status ORDERED. Validates the items, derives
    /// urgency, the expected amount and the delivery estimate. Nothing is
    /// persisted yet.
    pub fn create(code: String, request: NewPurchaseOrder) -> Result<Self, PurchaseError> {
        Self::validate(&request)?;

        let now = Utc::now();
        let expected_amount = expected_amount(&request.items);
        let urgency = UrgencyLevel::from_required_date(request.required_at, now.date_naive());
        let lead_time_days = request
            .items
            .iter()
            .map(OrderItem::calculated_lead_time)
            .max()
            .unwrap_or(0);

        Ok(Self {
            id: 0,
            code,
            status: OrderStatus::Ordered,
            order_at: now,
            required_at: request.required_at,
            expected_delivery_at: now + chrono::Duration::days(lead_time_days),
            received_at: None,
            canceled_at: None,
            factory_id: request.factory_id,
            factory_name: request.factory_name,
            requester_name: request.requester_name,
            urgency,
            expected_amount,
            deleted: false,
            deleted_at: None,
            items: request.items,
        })
    }

    /// Mark the order as received. Only valid while ORDERED.
    pub fn receive(&mut self) -> Result<(), PurchaseError> {
        if self.status != OrderStatus::Ordered {
            return Err(PurchaseError::AlreadyProcessed(self.status));
        }
        self.status = OrderStatus::Received;
        self.received_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel the order. Only valid while ORDERED.
    pub fn cancel(&mut self) -> Result<(), PurchaseError> {
        if self.status != OrderStatus::Ordered {
            return Err(PurchaseError::AlreadyProcessed(self.status));
        }
        self.status = OrderStatus::Canceled;
        self.canceled_at = Some(Utc::now());
        Ok(())
    }

    /// Soft-delete the order. No status precondition; the physical row
    /// survives for audit, but every subsequent read excludes it.
    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.deleted_at = Some(Utc::now());
    }
}

fn validate_items(items: &[OrderItem]) -> Result<(), PurchaseError> {
    if items.is_empty() {
        return Err(PurchaseError::EmptyItems);
    }
    for item in items {
        if item.quantity <= 0 {
            return Err(PurchaseError::InvalidQuantity(item.quantity));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(PurchaseError::InvalidUnitPrice(item.unit_price));
        }
    }
    Ok(())
}

fn expected_amount(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|item| Decimal::from(item.quantity) * item.unit_price)
        .sum()
}

// ============================================================================
// Order Code Generation
// ============================================================================
//
// Codes look like PR-250602-001: a constant tag, the compact date, and a
// per-day sequence zero-padded to three digits. The sequence is derived from
// the lexicographically greatest existing code for today's prefix; the
// UNIQUE constraint on the code column plus a bounded insert retry in the
// service covers concurrent creations racing for the same sequence.
//
// ============================================================================

pub fn code_prefix(today: NaiveDate) -> String {
    format!("PR-{}-", today.format("%y%m%d"))
}

pub fn next_code(prefix: &str, last_code: Option<&str>) -> String {
    let next_seq = last_code
        .and_then(|code| code.strip_prefix(prefix))
        .and_then(|seq| seq.parse::<u32>().ok())
        .map(|seq| seq + 1)
        .unwrap_or(1);

    format!("{}{:03}", prefix, next_seq)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn item(quantity: i64, unit_price: &str) -> OrderItem {
        OrderItem {
            material_code: "MAT-001".to_string(),
            material_name: "Steel bolt".to_string(),
            unit: "EA".to_string(),
            quantity,
            standard_quantity: None,
            lead_time_days: None,
            unit_price: unit_price.parse().unwrap(),
        }
    }

    fn request(items: Vec<OrderItem>) -> NewPurchaseOrder {
        NewPurchaseOrder {
            factory_id: 7,
            factory_name: "Ulsan Plant".to_string(),
            required_at: None,
            requester_name: "K. Park".to_string(),
            items,
        }
    }

    #[test]
    fn test_create_computes_expected_amount() {
        let order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(10, "5.00")]),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Ordered);
        assert_eq!(order.expected_amount, "50.00".parse().unwrap());
    }

    #[test]
    fn test_create_sums_across_items() {
        let order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(3, "1.25"), item(2, "10.00")]),
        )
        .unwrap();

        // 3 * 1.25 + 2 * 10.00
        assert_eq!(order.expected_amount, "23.75".parse().unwrap());
    }

    #[test]
    fn test_create_rejects_empty_items() {
        let result = PurchaseOrder::create("PR-250602-001".to_string(), request(vec![]));
        assert!(matches!(result, Err(PurchaseError::EmptyItems)));
    }

    #[test]
    fn test_create_rejects_non_positive_quantity() {
        let result =
            PurchaseOrder::create("PR-250602-001".to_string(), request(vec![item(0, "5.00")]));
        assert!(matches!(result, Err(PurchaseError::InvalidQuantity(0))));
    }

    #[test]
    fn test_create_rejects_negative_unit_price() {
        let result =
            PurchaseOrder::create("PR-250602-001".to_string(), request(vec![item(1, "-0.01")]));
        assert!(matches!(result, Err(PurchaseError::InvalidUnitPrice(_))));
    }

    #[test]
    fn test_validate_rejects_without_building() {
        assert!(matches!(
            PurchaseOrder::validate(&request(vec![])),
            Err(PurchaseError::EmptyItems)
        ));
        assert!(matches!(
            PurchaseOrder::validate(&request(vec![item(-1, "1.00")])),
            Err(PurchaseError::InvalidQuantity(-1))
        ));
        assert!(PurchaseOrder::validate(&request(vec![item(1, "1.00")])).is_ok());
    }

    #[test]
    fn test_expected_delivery_uses_longest_item_lead_time() {
        let mut fast = item(10, "1.00");
        fast.standard_quantity = Some(10);
        fast.lead_time_days = Some(2);

        let mut slow = item(25, "1.00");
        slow.standard_quantity = Some(10);
        slow.lead_time_days = Some(4); // ceil(2.5 * 4) = 10 days

        let order =
            PurchaseOrder::create("PR-250602-001".to_string(), request(vec![fast, slow])).unwrap();

        let days = (order.expected_delivery_at - order.order_at).num_days();
        assert_eq!(days, 10);
    }

    #[test]
    fn test_expected_delivery_defaults_to_order_date() {
        let order =
            PurchaseOrder::create("PR-250602-001".to_string(), request(vec![item(1, "1.00")]))
                .unwrap();
        assert_eq!(order.expected_delivery_at, order.order_at);
    }

    #[test]
    fn test_urgency_derived_from_required_date() {
        let today = Utc::now().date_naive();

        let cases = [
            (Some(today + Days::new(1)), UrgencyLevel::High),
            (Some(today + Days::new(3)), UrgencyLevel::Medium),
            (Some(today + Days::new(10)), UrgencyLevel::Low),
            (None, UrgencyLevel::Low),
        ];

        for (required_at, expected) in cases {
            let mut req = request(vec![item(1, "1.00")]);
            req.required_at = required_at;
            let order = PurchaseOrder::create("PR-250602-001".to_string(), req).unwrap();
            assert_eq!(order.urgency, expected, "required_at = {:?}", required_at);
        }
    }

    #[test]
    fn test_receive_sets_timestamp_once() {
        let mut order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(1, "1.00")]),
        )
        .unwrap();

        order.receive().unwrap();
        assert_eq!(order.status, OrderStatus::Received);
        assert!(order.received_at.is_some());
        assert!(order.canceled_at.is_none());
    }

    #[test]
    fn test_cancel_twice_fails() {
        let mut order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(1, "1.00")]),
        )
        .unwrap();

        order.cancel().unwrap();
        let result = order.cancel();
        assert!(matches!(
            result,
            Err(PurchaseError::AlreadyProcessed(OrderStatus::Canceled))
        ));
    }

    #[test]
    fn test_receive_after_cancel_fails() {
        let mut order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(1, "1.00")]),
        )
        .unwrap();

        order.cancel().unwrap();
        let result = order.receive();
        assert!(matches!(
            result,
            Err(PurchaseError::AlreadyProcessed(OrderStatus::Canceled))
        ));
        assert!(order.received_at.is_none());
    }

    #[test]
    fn test_soft_delete_has_no_status_precondition() {
        let mut order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            request(vec![item(1, "1.00")]),
        )
        .unwrap();
        order.receive().unwrap();

        order.soft_delete();
        assert!(order.deleted);
        assert!(order.deleted_at.is_some());
        assert_eq!(order.status, OrderStatus::Received);
    }

    #[test]
    fn test_code_prefix_format() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(code_prefix(today), "PR-250602-");
    }

    #[test]
    fn test_next_code_starts_at_one() {
        assert_eq!(next_code("PR-250602-", None), "PR-250602-001");
    }

    #[test]
    fn test_next_code_increments_greatest() {
        assert_eq!(
            next_code("PR-250602-", Some("PR-250602-041")),
            "PR-250602-042"
        );
    }

    #[test]
    fn test_next_code_ignores_malformed_sequence() {
        assert_eq!(
            next_code("PR-250602-", Some("PR-250602-xyz")),
            "PR-250602-001"
        );
    }
}
