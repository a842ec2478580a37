//! Live event feed for connected UI clients.

use std::sync::Arc;

use {
    async_trait::async_trait,
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

use courier_events::{EventSink, NormalizedEvent};

pub const DEFAULT_FEED_CAPACITY: usize = 512;

/// [`EventSink`] that fans serialized events out over a tokio broadcast
/// channel.
///
/// A slow subscriber lags and loses frames; it never blocks the pipeline
/// or other subscribers. No subscribers means the frame is dropped.
pub struct RealtimePublisher {
    tx: broadcast::Sender<String>,
}

impl RealtimePublisher {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventSink for RealtimePublisher {
    fn name(&self) -> &'static str {
        "realtime"
    }

    async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()> {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize realtime frame");
                return Ok(());
            },
        };
        // Err here just means nobody is listening.
        if self.tx.send(json).is_err() {
            debug!(tenant = %event.tenant, "realtime frame dropped, no subscribers");
        }
        Ok(())
    }
}
