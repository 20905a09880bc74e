// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Couples every order state change with a staged event in one database
// transaction, then delivers the staged events asynchronously:
//
// - event:  the wire envelope built from the aggregate snapshot
// - record: the staged row and its status transitions
// - store:  enqueue (on the use-case transaction) and relay-side queries
// - relay:  the polling publisher with backoff and dead-lettering
//
// ============================================================================

pub mod event;
pub mod record;
pub mod relay;
pub mod store;

pub use event::{PurchaseEvent, PurchaseEventType};
pub use record::{OutboxRecord, OutboxStatus};
pub use relay::{OutboxRelay, RelayConfig};
pub use store::{enqueue_tx, OutboxStorage, OutboxStore};
