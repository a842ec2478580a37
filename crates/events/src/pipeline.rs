//! Per-tenant ordered fan-out of normalized events.
//!
//! One bounded queue and one dispatcher task per tenant; queues for
//! different tenants run concurrently, events within a tenant never overlap.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock as StdRwLock},
};

use {
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

use crate::{sink::EventSink, types::NormalizedEvent};

/// Queue depth per tenant before `publish` applies backpressure.
const DEFAULT_QUEUE_DEPTH: usize = 256;

struct TenantQueue {
    tx: mpsc::Sender<NormalizedEvent>,
    handle: JoinHandle<()>,
    last_sequence: u64,
}

/// Fans events out to every registered sink, in per-tenant order.
pub struct EventPipeline {
    sinks: Arc<StdRwLock<Vec<Arc<dyn EventSink>>>>,
    queues: Mutex<HashMap<String, TenantQueue>>,
    queue_depth: usize,
}

impl EventPipeline {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Arc<Self> {
        Arc::new(Self {
            sinks: Arc::new(StdRwLock::new(sinks)),
            queues: Mutex::new(HashMap::new()),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        })
    }

    /// Register an additional sink. Dispatchers already running pick it
    /// up for their next event, so registration order at startup does not
    /// matter.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Enqueue one event for ordered delivery to every sink.
    ///
    /// Called only by the tenant's supervisor, once per provider callback,
    /// with a strictly increasing sequence number. Awaits when the tenant
    /// queue is full rather than dropping.
    pub async fn publish(&self, event: NormalizedEvent) {
        let tx = {
            let mut queues = self.queues.lock().await;
            let queue = queues
                .entry(event.tenant.clone())
                .or_insert_with(|| self.spawn_dispatcher(&event.tenant));
            if event.sequence <= queue.last_sequence && queue.last_sequence != 0 {
                warn!(
                    tenant = %event.tenant,
                    sequence = event.sequence,
                    last = queue.last_sequence,
                    "event sequence regressed; publishing anyway"
                );
            }
            queue.last_sequence = event.sequence;
            queue.tx.clone()
        };

        if tx.send(event).await.is_err() {
            // Dispatcher gone; only happens mid-retire.
            warn!("event dropped: tenant queue closed");
        }
    }

    /// Drop a tenant's queue after its supervisor is released.
    ///
    /// Already-enqueued events are drained before the dispatcher exits.
    pub async fn retire(&self, tenant: &str) {
        let queue = {
            let mut queues = self.queues.lock().await;
            queues.remove(tenant)
        };
        if let Some(queue) = queue {
            drop(queue.tx);
            if let Err(e) = queue.handle.await {
                warn!(tenant, error = %e, "tenant dispatcher ended abnormally");
            }
            debug!(tenant, "tenant event queue retired");
        }
    }

    /// Number of live tenant queues.
    pub async fn tenant_count(&self) -> usize {
        self.queues.lock().await.len()
    }

    fn spawn_dispatcher(&self, tenant: &str) -> TenantQueue {
        let (tx, mut rx) = mpsc::channel::<NormalizedEvent>(self.queue_depth);
        let sinks = Arc::clone(&self.sinks);
        let tenant = tenant.to_string();
        debug!(tenant, "starting tenant dispatcher");

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let sinks: Vec<Arc<dyn EventSink>> = {
                    let sinks = sinks.read().unwrap_or_else(|e| e.into_inner());
                    sinks.clone()
                };
                for sink in &sinks {
                    if let Err(e) = sink.deliver(&event).await {
                        warn!(
                            tenant = %event.tenant,
                            sequence = event.sequence,
                            kind = %event.kind(),
                            sink = sink.name(),
                            error = %e,
                            "sink failed; event skipped for this sink"
                        );
                    }
                }
            }
        });

        TenantQueue {
            tx,
            handle,
            last_sequence: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use {async_trait::async_trait, tokio::sync::Mutex as AsyncMutex};

    use {super::*, crate::types::EventPayload};

    fn pairing_event(tenant: &str, sequence: u64) -> NormalizedEvent {
        NormalizedEvent::new(tenant, sequence, EventPayload::PairingUpdated {
            artifact: format!("qr-{sequence}"),
        })
    }

    /// Records (tenant, sequence) pairs; optionally sleeps to shake out
    /// ordering races.
    struct RecordingSink {
        seen: AsyncMutex<Vec<(String, u64)>>,
        delay: Option<Duration>,
    }

    impl RecordingSink {
        fn new(delay: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                seen: AsyncMutex::new(Vec::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.seen
                .lock()
                .await
                .push((event.tenant.clone(), event.sequence));
            Ok(())
        }
    }

    struct FailingSink {
        calls: AtomicU64,
    }

    #[async_trait]
    impl EventSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _event: &NormalizedEvent) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn delivers_in_sequence_order_per_tenant() {
        let sink = RecordingSink::new(Some(Duration::from_millis(2)));
        let pipeline = EventPipeline::new(vec![sink.clone() as Arc<dyn EventSink>]);

        for seq in 1..=10 {
            pipeline.publish(pairing_event("t1", seq)).await;
        }
        pipeline.retire("t1").await;

        let seen = sink.seen.lock().await;
        let sequences: Vec<u64> = seen.iter().map(|(_, s)| *s).collect();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn tenants_do_not_block_each_other() {
        let slow = RecordingSink::new(Some(Duration::from_millis(50)));
        let pipeline = EventPipeline::new(vec![slow.clone() as Arc<dyn EventSink>]);

        // t1 has a slow event in flight; t2's event must still land quickly.
        pipeline.publish(pairing_event("t1", 1)).await;
        pipeline.publish(pairing_event("t2", 1)).await;

        tokio::time::timeout(Duration::from_millis(40), async {
            loop {
                if slow.seen.lock().await.iter().any(|(t, _)| t == "t2") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("t2 event was stalled behind t1");

        pipeline.retire("t1").await;
        pipeline.retire("t2").await;
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let failing = Arc::new(FailingSink {
            calls: AtomicU64::new(0),
        });
        let recording = RecordingSink::new(None);
        let pipeline = EventPipeline::new(vec![
            failing.clone() as Arc<dyn EventSink>,
            recording.clone() as Arc<dyn EventSink>,
        ]);

        for seq in 1..=3 {
            pipeline.publish(pairing_event("t1", seq)).await;
        }
        pipeline.retire("t1").await;

        assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
        assert_eq!(recording.seen.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn late_registered_sink_sees_subsequent_events() {
        let early = RecordingSink::new(None);
        let pipeline = EventPipeline::new(vec![early.clone() as Arc<dyn EventSink>]);

        pipeline.publish(pairing_event("t1", 1)).await;

        let late = RecordingSink::new(None);
        pipeline.add_sink(late.clone() as Arc<dyn EventSink>);
        pipeline.publish(pairing_event("t1", 2)).await;
        pipeline.retire("t1").await;

        assert_eq!(early.seen.lock().await.len(), 2);
        let late_seen = late.seen.lock().await;
        assert_eq!(late_seen.as_slice(), &[("t1".to_string(), 2)]);
    }

    #[tokio::test]
    async fn retire_drains_pending_events() {
        let sink = RecordingSink::new(Some(Duration::from_millis(5)));
        let pipeline = EventPipeline::new(vec![sink.clone() as Arc<dyn EventSink>]);

        for seq in 1..=5 {
            pipeline.publish(pairing_event("t1", seq)).await;
        }
        pipeline.retire("t1").await;

        assert_eq!(sink.seen.lock().await.len(), 5);
        assert_eq!(pipeline.tenant_count().await, 0);
    }
}
