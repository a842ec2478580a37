//! Core data types shared between the session, pipeline, and worker crates.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tenant's provider connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Loading credentials / establishing the first connection.
    Initializing,
    /// Waiting for the pairing artifact to be scanned.
    AwaitingPairing,
    /// Live connection; the only state that accepts outbound sends.
    Connected,
    /// Transport lost; a reconnect is pending or in backoff.
    Disconnected,
    /// Terminal: credentials revoked or explicit logout. No retry.
    LoggedOut,
}

impl SessionStatus {
    /// Terminal states never transition again without re-provisioning.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::AwaitingPairing => "awaitingPairing",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut => "loggedOut",
        };
        f.write_str(s)
    }
}

/// Who asked for an outbound send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobSource {
    Api,
    Scheduled,
    AutoReply,
}

/// A unit of outbound work on a tenant's connection.
///
/// `(tenant, job_id)` is the idempotency key consumers use to reconcile
/// partial failures (sent but not persisted, and the reverse).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundJob {
    pub job_id: String,
    pub tenant: String,
    pub recipient: String,
    pub body: String,
    pub source: JobSource,
}

impl OutboundJob {
    pub fn new(
        tenant: impl Into<String>,
        recipient: impl Into<String>,
        body: impl Into<String>,
        source: JobSource,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            tenant: tenant.into(),
            recipient: recipient.into(),
            body: body.into(),
            source,
        }
    }
}

/// Terminal outcome of dispatching an [`OutboundJob`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobOutcome {
    /// The provider accepted the send call (not a delivery guarantee).
    Sent { message_id: String },
    /// No supervisor registered for the tenant. Retryable by the caller.
    NotFound,
    /// A supervisor exists but is not in `Connected`. Retryable.
    NotConnected,
    /// Rejected input; never retried.
    Invalid { reason: String },
    /// Transport-level send error. Retryable; does not change session state.
    Transport { reason: String },
}

impl JobOutcome {
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}
