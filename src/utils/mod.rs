pub mod backoff;

pub use backoff::{compute_backoff, BackoffConfig};
