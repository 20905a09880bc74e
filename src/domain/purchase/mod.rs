// ============================================================================
// Purchase Order Domain
// ============================================================================
//
// The purchase order aggregate for factory material replenishment, its
// persistence, and the use-case layer that drives it. All state flows
// ORDERED -> RECEIVED or ORDERED -> CANCELED; both end states are terminal.
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod service;
pub mod value_objects;

pub use aggregate::{NewPurchaseOrder, PurchaseOrder};
pub use errors::PurchaseError;
pub use repository::OrderFilter;
pub use service::{PageResponse, PurchaseOrderView, PurchaseService};
pub use value_objects::{OrderItem, OrderStatus, UrgencyLevel};
