// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Tracks relay delivery outcomes per event type:
// - published / retried / dead-lettered counts
// - broker publish latency
//
// Scraped via the /metrics HTTP endpoint.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    /// Outbox rows acknowledged by the broker
    pub outbox_published: IntCounterVec,
    /// Failed attempts that were rescheduled
    pub outbox_retried: IntCounterVec,
    /// Rows that exhausted their retry budget
    pub outbox_dead: IntCounterVec,
    /// Broker publish latency including the acknowledgment wait
    pub publish_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let outbox_published = IntCounterVec::new(
            Opts::new(
                "outbox_published_total",
                "Outbox events acknowledged by the broker",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_retried = IntCounterVec::new(
            Opts::new(
                "outbox_retried_total",
                "Outbox publish failures scheduled for retry",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_retried.clone()))?;

        let outbox_dead = IntCounterVec::new(
            Opts::new(
                "outbox_dead_total",
                "Outbox events dead-lettered after exhausting retries",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_dead.clone()))?;

        let publish_duration = HistogramVec::new(
            HistogramOpts::new(
                "outbox_publish_duration_seconds",
                "Broker publish duration per attempt",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(publish_duration.clone()))?;

        Ok(Self {
            registry,
            outbox_published,
            outbox_retried,
            outbox_dead,
            publish_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_conflict() {
        let metrics = Metrics::new().unwrap();

        metrics
            .outbox_published
            .with_label_values(&["PurchaseOrderCreated"])
            .inc();
        metrics
            .outbox_dead
            .with_label_values(&["PurchaseOrderCanceled"])
            .inc();

        let families = metrics.registry().gather();
        assert!(families.len() >= 2);
    }
}
