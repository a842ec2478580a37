//! Scheduled message rows.

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use courier_common::now_ms;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Sent and Failed are terminal; a row never leaves them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub tenant: String,
    pub recipient: String,
    pub body: String,
    /// Due instant, UTC epoch milliseconds.
    pub due_at_ms: u64,
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at_ms: Option<u64>,
}

impl ScheduledMessage {
    pub fn new(tenant: &str, recipient: &str, body: &str, due_at_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
            due_at_ms,
            status: ScheduleStatus::Pending,
            error: None,
            created_at_ms: now_ms(),
            sent_at_ms: None,
        }
    }
}
