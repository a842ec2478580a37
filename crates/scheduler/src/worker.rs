//! Tick worker that turns due rows into sends.

use std::{sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use {
    courier_common::{JobOutcome, JobSource, OutboundJob, now_ms},
    courier_session::{SessionRegistry, dispatch_job},
};

use crate::{store::ScheduleStore, types::ScheduledMessage};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
        }
    }
}

/// Polls the store on a fixed tick, claims due rows, and dispatches them
/// through the shared outbound path.
///
/// A row that cannot be sent (tenant absent, not connected, transport
/// failure) goes to `Failed` with a reason and is never retried; the
/// claim CAS guarantees at most one dispatch per row even with
/// overlapping ticks.
pub struct ScheduledSendWorker {
    config: WorkerConfig,
    store: Arc<dyn ScheduleStore>,
    registry: Arc<SessionRegistry>,
    running: RwLock<bool>,
    wake: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledSendWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ScheduleStore>,
        registry: Arc<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            registry,
            running: RwLock::new(false),
            wake: Notify::new(),
            handle: Mutex::new(None),
        })
    }

    /// Store a new message and nudge the tick loop in case it is already
    /// due.
    pub async fn schedule(&self, message: ScheduledMessage) -> anyhow::Result<ScheduledMessage> {
        self.store.insert(message.clone()).await?;
        debug!(
            id = %message.id,
            tenant = %message.tenant,
            due_at_ms = message.due_at_ms,
            "message scheduled"
        );
        self.wake.notify_one();
        Ok(message)
    }

    pub async fn start(self: &Arc<Self>) {
        *self.running.write().await = true;
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            worker.run().await;
        });
        *self.handle.lock().await = Some(handle);
        info!(tick_ms = self.config.tick_interval.as_millis() as u64, "schedule worker started");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake.notify_one();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("schedule worker stopped");
    }

    async fn run(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }
            self.tick().await;
            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval) => {},
                () = self.wake.notified() => {},
            }
        }
    }

    async fn tick(&self) {
        let due = match self.store.due(now_ms()).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due scan failed");
                return;
            },
        };

        for message in due {
            let claimed = match self.store.claim(&message.id).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(id = %message.id, error = %e, "claim failed");
                    continue;
                },
            };
            if !claimed {
                // Another tick got there first.
                continue;
            }
            self.dispatch(&message).await;
        }
    }

    async fn dispatch(&self, message: &ScheduledMessage) {
        let job = OutboundJob::new(
            &message.tenant,
            &message.recipient,
            &message.body,
            JobSource::Scheduled,
        );
        let outcome = dispatch_job(&self.registry, &job).await;
        let result = match outcome {
            JobOutcome::Sent { message_id } => {
                debug!(id = %message.id, message_id, "scheduled message sent");
                self.store.mark_sent(&message.id, now_ms()).await
            },
            JobOutcome::NotFound => {
                self.store
                    .mark_failed(&message.id, "no session for tenant")
                    .await
            },
            JobOutcome::NotConnected => {
                self.store
                    .mark_failed(&message.id, "session not connected")
                    .await
            },
            JobOutcome::Invalid { reason } | JobOutcome::Transport { reason } => {
                self.store.mark_failed(&message.id, &reason).await
            },
        };
        if let Err(e) = result {
            warn!(id = %message.id, error = %e, "failed to record outcome");
        }
    }
}
