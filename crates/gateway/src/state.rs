//! Shared gateway state.

use std::sync::Arc;

use {
    courier_events::EventPipeline,
    courier_scheduler::ScheduledSendWorker,
    courier_session::SessionRegistry,
};

use crate::realtime::RealtimePublisher;

/// Everything the HTTP surface needs, bundled once at startup.
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<EventPipeline>,
    pub scheduler: Arc<ScheduledSendWorker>,
    pub realtime: Arc<RealtimePublisher>,
}

impl GatewayState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: Arc<EventPipeline>,
        scheduler: Arc<ScheduledSendWorker>,
        realtime: Arc<RealtimePublisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            pipeline,
            scheduler,
            realtime,
        })
    }
}
