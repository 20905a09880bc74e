use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Purchase Order Value Objects
// ============================================================================

/// One line of a purchase order: a material and how much of it to buy.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub material_code: String,
    pub material_name: String,
    pub unit: String,
    pub quantity: i64,
    /// Supplier pack size that one lead time quotes for; optional master data
    pub standard_quantity: Option<i64>,
    /// Quoted delivery lead time for one standard quantity, in days
    pub lead_time_days: Option<i32>,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Delivery lead time scaled to the ordered quantity, in days:
    /// ceil(quantity / standard_quantity) x lead_time_days. Falls back to
    /// the quoted days when the pack size is missing or zero, and to zero
    /// when no lead time is quoted at all.
    pub fn calculated_lead_time(&self) -> i64 {
        let Some(lead_time_days) = self.lead_time_days else {
            return 0;
        };
        match self.standard_quantity {
            Some(standard) if standard > 0 => {
                let ratio = self.quantity as f64 / standard as f64;
                (ratio * lead_time_days as f64).ceil() as i64
            }
            _ => lead_time_days as i64,
        }
    }
}

/// Purchase order lifecycle. ORDERED is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Ordered,
    Received,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ORDERED",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown value in status column: {0}")]
pub struct ParseStatusError(String);

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDERED" => Ok(OrderStatus::Ordered),
            "RECEIVED" => Ok(OrderStatus::Received),
            "CANCELED" => Ok(OrderStatus::Canceled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// How soon the order is required. Derived once at creation, reported only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    High,
    Medium,
    Low,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::High => "HIGH",
            UrgencyLevel::Medium => "MEDIUM",
            UrgencyLevel::Low => "LOW",
        }
    }

    /// Classify by calendar days between `today` and the required-by date.
    pub fn from_required_date(
        required_at: Option<chrono::NaiveDate>,
        today: chrono::NaiveDate,
    ) -> Self {
        match required_at {
            None => UrgencyLevel::Low,
            Some(date) => {
                let days = (date - today).num_days();
                if days <= 1 {
                    UrgencyLevel::High
                } else if days <= 3 {
                    UrgencyLevel::Medium
                } else {
                    UrgencyLevel::Low
                }
            }
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrgencyLevel {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(UrgencyLevel::High),
            "MEDIUM" => Ok(UrgencyLevel::Medium),
            "LOW" => Ok(UrgencyLevel::Low),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_status_round_trip() {
        for status in [OrderStatus::Ordered, OrderStatus::Received, OrderStatus::Canceled] {
            let parsed: OrderStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_status_rejects_unknown_value() {
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_upper_case() {
        let json = serde_json::to_string(&OrderStatus::Ordered).unwrap();
        assert_eq!(json, "\"ORDERED\"");
    }

    #[test]
    fn test_urgency_classification() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        let cases = [
            (Some(today), UrgencyLevel::High),
            (Some(today + chrono::Days::new(1)), UrgencyLevel::High),
            (Some(today + chrono::Days::new(2)), UrgencyLevel::Medium),
            (Some(today + chrono::Days::new(3)), UrgencyLevel::Medium),
            (Some(today + chrono::Days::new(4)), UrgencyLevel::Low),
            (Some(today + chrono::Days::new(10)), UrgencyLevel::Low),
            (None, UrgencyLevel::Low),
        ];

        for (required_at, expected) in cases {
            assert_eq!(
                UrgencyLevel::from_required_date(required_at, today),
                expected,
                "required_at = {:?}",
                required_at
            );
        }
    }

    #[test]
    fn test_order_item_serialization() {
        let item = OrderItem {
            material_code: "MAT-001".to_string(),
            material_name: "Steel bolt".to_string(),
            unit: "EA".to_string(),
            quantity: 10,
            standard_quantity: Some(5),
            lead_time_days: Some(3),
            unit_price: Decimal::new(500, 2),
        };

        let json = serde_json::to_string(&item).unwrap();
        let deserialized: OrderItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, deserialized);
    }

    fn lead_item(quantity: i64, standard: Option<i64>, lead: Option<i32>) -> OrderItem {
        OrderItem {
            material_code: "MAT-002".to_string(),
            material_name: "Bearing 6204".to_string(),
            unit: "EA".to_string(),
            quantity,
            standard_quantity: standard,
            lead_time_days: lead,
            unit_price: Decimal::new(100, 2),
        }
    }

    #[test]
    fn test_lead_time_scales_with_quantity_and_rounds_up() {
        // 25 / 10 = 2.5 pack multiples, 2.5 * 4 days rounds up to 10
        assert_eq!(lead_item(25, Some(10), Some(4)).calculated_lead_time(), 10);
        // exact multiple, no rounding
        assert_eq!(lead_item(20, Some(10), Some(4)).calculated_lead_time(), 8);
    }

    #[test]
    fn test_lead_time_falls_back_to_quoted_days_without_pack_size() {
        assert_eq!(lead_item(25, None, Some(4)).calculated_lead_time(), 4);
        assert_eq!(lead_item(25, Some(0), Some(4)).calculated_lead_time(), 4);
    }

    #[test]
    fn test_lead_time_is_zero_when_unquoted() {
        assert_eq!(lead_item(25, Some(10), None).calculated_lead_time(), 0);
        assert_eq!(lead_item(25, None, None).calculated_lead_time(), 0);
    }
}
