//! The closed tagged union every downstream sink consumes.
//!
//! Provider payload shapes are translated once, at the supervisor boundary;
//! nothing downstream depends on provider-specific JSON.

use {
    courier_common::SessionStatus,
    serde::{Deserialize, Serialize},
};

/// Subscribable event kinds, with their wire names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "message.received")]
    MessageReceived,
    #[serde(rename = "message.ack")]
    MessageAck,
    #[serde(rename = "connection.state")]
    ConnectionState,
    #[serde(rename = "pairing.updated")]
    PairingUpdated,
    #[serde(rename = "group.updated")]
    GroupUpdated,
    #[serde(rename = "presence.updated")]
    PresenceUpdated,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageReceived => "message.received",
            Self::MessageAck => "message.ack",
            Self::ConnectionState => "connection.state",
            Self::PairingUpdated => "pairing.updated",
            Self::GroupUpdated => "group.updated",
            Self::PresenceUpdated => "presence.updated",
        }
    }

    pub const ALL: [Self; 6] = [
        Self::MessageReceived,
        Self::MessageAck,
        Self::ConnectionState,
        Self::PairingUpdated,
        Self::GroupUpdated,
        Self::PresenceUpdated,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound chat message, normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub message_id: String,
    /// Chat the message arrived in (DM peer or group id).
    pub chat: String,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub body: String,
    /// True when the tenant's own account produced the message (echo).
    #[serde(default)]
    pub from_me: bool,
    pub timestamp_ms: u64,
}

/// Delivery acknowledgement for a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    pub message_id: String,
    pub recipient: String,
    /// Provider ack level ("sent", "delivered", "read", ...).
    pub status: String,
}

/// Group metadata change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    pub group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
}

/// Presence change for a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub peer: String,
    pub presence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_ms: Option<u64>,
}

/// Event payload union. The serde tag doubles as the wire event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum EventPayload {
    #[serde(rename = "message.received")]
    MessageReceived(IncomingMessage),
    #[serde(rename = "message.ack")]
    MessageAck(MessageAck),
    #[serde(rename = "connection.state", rename_all = "camelCase")]
    ConnectionState {
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "pairing.updated", rename_all = "camelCase")]
    PairingUpdated { artifact: String },
    #[serde(rename = "group.updated")]
    GroupUpdated(GroupUpdate),
    #[serde(rename = "presence.updated")]
    PresenceUpdated(PresenceUpdate),
}

impl EventPayload {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageReceived(_) => EventKind::MessageReceived,
            Self::MessageAck(_) => EventKind::MessageAck,
            Self::ConnectionState { .. } => EventKind::ConnectionState,
            Self::PairingUpdated { .. } => EventKind::PairingUpdated,
            Self::GroupUpdated(_) => EventKind::GroupUpdated,
            Self::PresenceUpdated(_) => EventKind::PresenceUpdated,
        }
    }
}

/// One normalized event on a tenant's stream. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub tenant: String,
    /// Strictly increasing per tenant; assigned by the supervisor.
    pub sequence: u64,
    pub at_ms: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl NormalizedEvent {
    pub fn new(tenant: impl Into<String>, sequence: u64, payload: EventPayload) -> Self {
        Self {
            tenant: tenant.into(),
            sequence,
            at_ms: courier_common::now_ms(),
            payload,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
