//! Schedule persistence.

use async_trait::async_trait;

use crate::types::ScheduledMessage;

/// Storage contract for scheduled messages.
///
/// `claim` is the concurrency primitive: it flips `Pending -> Sending`
/// atomically and reports whether this caller won, so two ticks racing on
/// the same row produce exactly one send.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, message: ScheduledMessage) -> anyhow::Result<()>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<ScheduledMessage>>;

    /// All rows, optionally filtered by tenant, ordered by due time.
    async fn list(&self, tenant: Option<&str>) -> anyhow::Result<Vec<ScheduledMessage>>;

    /// Pending rows due at or before `now_ms`, ordered by due time.
    async fn due(&self, now_ms: u64) -> anyhow::Result<Vec<ScheduledMessage>>;

    /// Compare-and-set `Pending -> Sending`. False when the row is absent
    /// or some other claimer already moved it.
    async fn claim(&self, id: &str) -> anyhow::Result<bool>;

    /// Terminal success. Only valid from `Sending`.
    async fn mark_sent(&self, id: &str, sent_at_ms: u64) -> anyhow::Result<()>;

    /// Terminal failure with a reason. Valid from `Pending` or `Sending`.
    async fn mark_failed(&self, id: &str, error: &str) -> anyhow::Result<()>;
}
