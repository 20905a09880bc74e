use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::utils::{compute_backoff, BackoffConfig};

use super::record::OutboxRecord;
use super::store::OutboxStorage;

// ============================================================================
// Outbox Relay
// ============================================================================
//
// Background publisher for staged events. Wakes on a fixed interval, picks a
// bounded batch of deliverable rows, attempts each publication with a
// bounded wait, and persists the resulting status transition per row. One
// row's failure never blocks another row in the same batch.
//
// Single active instance assumed: batch selection does not claim rows, so
// running two relays against one outbox table can double-publish. Scale-out
// needs a skip-locked claim step first.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Broker topic for all purchase events
    pub topic: String,
    /// Fixed wake interval between ticks
    pub poll_interval: Duration,
    /// Upper bound on rows per tick
    pub batch_size: i64,
    /// Attempts before a row is dead-lettered
    pub max_retry: i32,
    pub backoff: BackoffConfig,
    /// Stored errors are truncated to this many bytes
    pub max_error_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            topic: "purchase-events".to_string(),
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_retry: 10,
            backoff: BackoffConfig::default(),
            max_error_len: 2000,
        }
    }
}

/// What to do with a row after a failed publish attempt.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Retry(Duration),
    Dead,
}

/// Decide from the pre-increment retry count. The same `retry_count + 1`
/// value drives both this check and the counter the store persists, so the
/// two can never drift apart.
fn disposition_for_failure(retry_count: i32, config: &RelayConfig) -> Disposition {
    let next_retry = retry_count + 1;
    if next_retry >= config.max_retry {
        Disposition::Dead
    } else {
        Disposition::Retry(compute_backoff(&config.backoff, next_retry as u32))
    }
}

fn truncate_error(error: &str, max_len: usize) -> String {
    if error.len() <= max_len {
        error.to_string()
    } else {
        let mut end = max_len;
        while end > 0 && !error.is_char_boundary(end) {
            end -= 1;
        }
        error[..end].to_string()
    }
}

pub struct OutboxRelay {
    store: Arc<dyn OutboxStorage>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStorage>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            config,
        }
    }

    /// Main polling loop. Each tick runs to completion before the next sleep
    /// starts, so ticks never overlap.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            topic = %self.config.topic,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Outbox relay received shutdown signal");
                        break;
                    }
                }

                _ = sleep(self.config.poll_interval) => {
                    if let Err(e) = self.publish_batch().await {
                        tracing::error!(error = %e, "Outbox batch failed");
                    }
                }
            }
        }

        tracing::info!("Outbox relay shutdown complete");
    }

    /// Run one tick: select a batch and attempt every row independently.
    /// Returns how many rows were published.
    pub async fn publish_batch(&self) -> Result<usize, sqlx::Error> {
        let batch = self
            .store
            .pick_ready_batch(self.config.batch_size, self.config.max_retry)
            .await?;

        if batch.is_empty() {
            return Ok(0);
        }

        tracing::debug!(batch_size = batch.len(), "Picked outbox batch");

        let mut published = 0;
        for record in batch {
            if self.dispatch(record).await? {
                published += 1;
            }
        }

        Ok(published)
    }

    /// Attempt one row and persist its transition. Publish errors are
    /// recorded on the row; only storage errors propagate.
    async fn dispatch(&self, mut record: OutboxRecord) -> Result<bool, sqlx::Error> {
        let key = record.aggregate_id.to_string();
        let payload = record.payload.to_string();

        let timer = self
            .metrics
            .publish_duration
            .with_label_values(&[record.event_type.as_str()])
            .start_timer();
        let result = self.publisher.publish(&self.config.topic, &key, &payload).await;
        timer.observe_duration();

        match result {
            Ok(()) => {
                record.mark_published();
                self.store.save(&record).await?;
                self.metrics
                    .outbox_published
                    .with_label_values(&[record.event_type.as_str()])
                    .inc();
                tracing::info!(
                    outbox_id = record.id,
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    aggregate_id = record.aggregate_id,
                    "Published outbox event"
                );
                Ok(true)
            }
            Err(e) => {
                let error = truncate_error(&e.to_string(), self.config.max_error_len);

                match disposition_for_failure(record.retry_count, &self.config) {
                    Disposition::Dead => {
                        record.mark_dead(error);
                        self.store.save(&record).await?;
                        self.metrics
                            .outbox_dead
                            .with_label_values(&[record.event_type.as_str()])
                            .inc();
                        tracing::error!(
                            outbox_id = record.id,
                            event_id = %record.event_id,
                            retry_count = record.retry_count,
                            error = %e,
                            "Outbox event dead-lettered"
                        );
                    }
                    Disposition::Retry(delay) => {
                        let next_retry_at = Utc::now()
                            + chrono::Duration::milliseconds(delay.as_millis() as i64);
                        record.mark_failed(error, next_retry_at);
                        self.store.save(&record).await?;
                        self.metrics
                            .outbox_retried
                            .with_label_values(&[record.event_type.as_str()])
                            .inc();
                        tracing::warn!(
                            outbox_id = record.id,
                            event_id = %record.event_id,
                            retry_count = record.retry_count,
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "Outbox publish failed, will retry"
                        );
                    }
                }
                Ok(false)
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// The pure dispatch decisions are tested directly; the full dispatch path
// runs against an in-memory store and stub publishers, asserting the
// transition that would be persisted. Only `OutboxStore`'s SQL itself needs
// Postgres and is exercised by the demo binary.
//
// ============================================================================
