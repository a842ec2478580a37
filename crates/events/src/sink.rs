//! Sink trait implemented by every independent event consumer.

use async_trait::async_trait;

use crate::types::NormalizedEvent;

/// An independent consumer of the normalized event stream.
///
/// Sinks for the same tenant are invoked one event at a time: `deliver` for
/// event N has returned before any sink sees event N+1 of that tenant. A
/// returned error is logged and the event is skipped for that sink only —
/// sinks own their retries (the webhook dispatcher queues its own), never
/// the pipeline's dispatch slot.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short sink name for logs ("webhook", "auto-reply", ...).
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()>;
}
