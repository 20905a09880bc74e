use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::purchase::PurchaseOrder;

// ============================================================================
// Purchase Event Envelope
// ============================================================================
//
// The serialized payload staged in the outbox and shipped to the broker.
// Field names are camelCase on the wire; downstream consumers dedupe on
// `eventId`. The envelope is built from the aggregate snapshot at the moment
// of the transition, never from a reference that could go stale.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseEventType {
    Created,
    Received,
    Canceled,
    Deleted,
}

impl PurchaseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseEventType::Created => "PurchaseOrderCreated",
            PurchaseEventType::Received => "PurchaseOrderReceived",
            PurchaseEventType::Canceled => "PurchaseOrderCanceled",
            PurchaseEventType::Deleted => "PurchaseOrderDeleted",
        }
    }
}

impl fmt::Display for PurchaseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current envelope schema version.
const EVENT_VERSION: i64 = 1;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub version: i64,
    pub occurred_at: String,
    pub payload: PurchasePayload,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    pub order_id: i64,
    pub order_code: String,
    pub factory_id: i64,
    pub factory_name: String,
    pub status: String,
    pub received_at: Option<String>,
    pub deleted: bool,
    pub materials: Vec<Material>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub material_code: String,
    pub material_name: String,
    pub quantity: i64,
    pub unit: String,
}

impl PurchaseEvent {
    /// Build an envelope from an aggregate snapshot, assigning a fresh
    /// event id to serve as the broker idempotency key.
    pub fn from_order(event_type: PurchaseEventType, order: &PurchaseOrder, deleted: bool) -> Self {
        let materials = order
            .items
            .iter()
            .map(|item| Material {
                material_code: item.material_code.clone(),
                material_name: item.material_name.clone(),
                quantity: item.quantity,
                unit: item.unit.clone(),
            })
            .collect();

        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.as_str().to_string(),
            version: EVENT_VERSION,
            occurred_at: chrono::Utc::now().to_rfc3339(),
            payload: PurchasePayload {
                order_id: order.id,
                order_code: order.code.clone(),
                factory_id: order.factory_id,
                factory_name: order.factory_name.clone(),
                status: order.status.as_str().to_string(),
                received_at: order.received_at.map(|at| at.to_rfc3339()),
                deleted,
                materials,
            },
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::{NewPurchaseOrder, OrderItem};

    fn order() -> PurchaseOrder {
        let mut order = PurchaseOrder::create(
            "PR-250602-001".to_string(),
            NewPurchaseOrder {
                factory_id: 7,
                factory_name: "Ulsan Plant".to_string(),
                required_at: None,
                requester_name: "K. Park".to_string(),
                items: vec![OrderItem {
                    material_code: "MAT-001".to_string(),
                    material_name: "Steel bolt".to_string(),
                    unit: "EA".to_string(),
                    quantity: 10,
                    standard_quantity: None,
                    lead_time_days: None,
                    unit_price: "5.00".parse().unwrap(),
                }],
            },
        )
        .unwrap();
        order.id = 42;
        order
    }

    #[test]
    fn test_envelope_carries_snapshot_fields() {
        let event = PurchaseEvent::from_order(PurchaseEventType::Created, &order(), false);

        assert_eq!(event.event_type, "PurchaseOrderCreated");
        assert_eq!(event.version, 1);
        assert_eq!(event.payload.order_id, 42);
        assert_eq!(event.payload.order_code, "PR-250602-001");
        assert_eq!(event.payload.status, "ORDERED");
        assert_eq!(event.payload.received_at, None);
        assert!(!event.payload.deleted);
        assert_eq!(event.payload.materials.len(), 1);
        assert_eq!(event.payload.materials[0].quantity, 10);
    }

    #[test]
    fn test_each_envelope_gets_a_fresh_event_id() {
        let order = order();
        let first = PurchaseEvent::from_order(PurchaseEventType::Created, &order, false);
        let second = PurchaseEvent::from_order(PurchaseEventType::Created, &order, false);
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let event = PurchaseEvent::from_order(PurchaseEventType::Deleted, &order(), true);
        let json = serde_json::to_value(&event).unwrap();

        assert!(json.get("eventId").is_some());
        assert!(json.get("eventType").is_some());
        assert!(json.get("occurredAt").is_some());

        let payload = json.get("payload").unwrap();
        assert!(payload.get("orderId").is_some());
        assert!(payload.get("orderCode").is_some());
        assert!(payload.get("factoryName").is_some());
        assert_eq!(payload.get("deleted").unwrap(), &serde_json::json!(true));

        let material = &payload.get("materials").unwrap()[0];
        assert!(material.get("materialCode").is_some());
        assert!(material.get("materialName").is_some());
    }

    #[test]
    fn test_received_at_present_after_receive() {
        let mut order = order();
        order.receive().unwrap();

        let event = PurchaseEvent::from_order(PurchaseEventType::Received, &order, false);
        assert_eq!(event.payload.status, "RECEIVED");
        assert!(event.payload.received_at.is_some());
    }
}
