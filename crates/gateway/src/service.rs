//! Gateway operations, independent of the HTTP layer.

use std::sync::Arc;

use {
    serde::Serialize,
    tracing::info,
    uuid::Uuid,
};

use {
    courier_common::{JobOutcome, JobSource, OutboundJob, SessionStatus},
    courier_scheduler::ScheduledMessage,
    courier_session::{TenantSession, dispatch_job},
};

use crate::state::GatewayState;

/// Where a tenant stands in the pairing flow.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PairingInfo {
    /// Pairing in progress; the artifact appears asynchronously once the
    /// provider issues it.
    #[serde(rename_all = "camelCase")]
    AwaitingPairing {
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
    /// Already paired; there is nothing to scan.
    Connected,
    /// Not in a pairing phase (initializing, disconnected, logged out).
    #[serde(rename_all = "camelCase")]
    Pending { status: SessionStatus },
}

/// Outcome of a schedule request.
#[derive(Debug)]
pub enum ScheduleResult {
    Accepted(ScheduledMessage),
    NotFound,
    Invalid(String),
}

#[derive(Clone)]
pub struct GatewayService {
    state: Arc<GatewayState>,
}

impl GatewayService {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Provision (or re-attach to) a tenant session. Returns immediately
    /// with the session in its current state; pairing artifacts and
    /// connection progress arrive on the event stream.
    pub async fn provision(
        &self,
        owner: &str,
        display_name: Option<String>,
        tenant: Option<String>,
    ) -> TenantSession {
        let tenant = tenant.unwrap_or_else(|| Uuid::new_v4().to_string());
        let supervisor = self
            .state
            .registry
            .acquire(&tenant, owner, display_name)
            .await;
        info!(tenant, owner, "provision requested");
        supervisor.snapshot()
    }

    pub async fn describe(&self, tenant: &str) -> Option<TenantSession> {
        let supervisor = self.state.registry.lookup(tenant).await?;
        Some(supervisor.snapshot())
    }

    pub async fn pairing(&self, tenant: &str) -> Option<PairingInfo> {
        let supervisor = self.state.registry.lookup(tenant).await?;
        let info = match supervisor.status() {
            SessionStatus::AwaitingPairing => PairingInfo::AwaitingPairing {
                artifact: supervisor.pairing_artifact(),
            },
            SessionStatus::Connected => PairingInfo::Connected,
            status => PairingInfo::Pending { status },
        };
        Some(info)
    }

    pub async fn send(&self, tenant: &str, recipient: &str, body: &str) -> JobOutcome {
        let job = OutboundJob::new(tenant, recipient, body, JobSource::Api);
        dispatch_job(&self.state.registry, &job).await
    }

    pub async fn schedule(
        &self,
        tenant: &str,
        recipient: &str,
        body: &str,
        due_at_ms: u64,
    ) -> anyhow::Result<ScheduleResult> {
        if self.state.registry.lookup(tenant).await.is_none() {
            return Ok(ScheduleResult::NotFound);
        }
        if recipient.trim().is_empty() {
            return Ok(ScheduleResult::Invalid("recipient must not be empty".into()));
        }
        if body.trim().is_empty() {
            return Ok(ScheduleResult::Invalid("body must not be empty".into()));
        }

        let message = ScheduledMessage::new(tenant, recipient, body, due_at_ms);
        let stored = self.state.scheduler.schedule(message).await?;
        Ok(ScheduleResult::Accepted(stored))
    }

    /// Tear the session down. The tenant's event queue drains before it
    /// is retired.
    pub async fn release(&self, tenant: &str) -> bool {
        self.state.registry.release(tenant).await
    }
}
