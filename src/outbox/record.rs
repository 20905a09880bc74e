use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Outbox Record - Staged Event Row
// ============================================================================
//
// One row per domain event, created in the same transaction as the state
// change that produced it. The relay owns every transition after READY:
//
//   READY ----> PUBLISHED                (broker acknowledged)
//   READY ----> FAILED -> ... -> DEAD    (retries exhausted)
//
// PUBLISHED and DEAD are terminal. Rows are never deleted here; DEAD rows
// wait for operator replay or discard.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Ready,
    Published,
    Failed,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Ready => "READY",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
            OutboxStatus::Dead => "DEAD",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown outbox status: {0}")]
pub struct ParseOutboxStatusError(String);

impl FromStr for OutboxStatus {
    type Err = ParseOutboxStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(OutboxStatus::Ready),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            "DEAD" => Ok(OutboxStatus::Dead),
            other => Err(ParseOutboxStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: i64,
    pub event_type: String,
    pub aggregate_id: i64,
    pub event_id: Uuid,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub occurred_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_tried_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Broker acknowledged the publication. Terminal.
    pub fn mark_published(&mut self) {
        let now = Utc::now();
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        self.last_tried_at = Some(now);
        self.next_retry_at = None;
    }

    /// Transient failure with retries remaining.
    pub fn mark_failed(&mut self, error: String, next_retry_at: DateTime<Utc>) {
        self.status = OutboxStatus::Failed;
        self.last_error = Some(error);
        self.retry_count += 1;
        self.last_tried_at = Some(Utc::now());
        self.next_retry_at = Some(next_retry_at);
    }

    /// Retry budget exhausted. Terminal; counts the final attempt too, so a
    /// dead row always shows retry_count == MAX_RETRY.
    pub fn mark_dead(&mut self, error: String) {
        self.status = OutboxStatus::Dead;
        self.last_error = Some(error);
        self.retry_count += 1;
        self.last_tried_at = Some(Utc::now());
        self.next_retry_at = None;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
