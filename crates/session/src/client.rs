//! The opaque provider connection primitive.
//!
//! Implementations wrap whatever the messaging network actually speaks
//! (the bridge crate ships a WebSocket sidecar client); the supervisor
//! only ever sees this trait and the typed events it emits.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use courier_events::{GroupUpdate, IncomingMessage, MessageAck, PresenceUpdate};

/// Opaque per-tenant authentication material.
///
/// The blob's shape belongs to the provider; courier only stores and
/// replays it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub blob: serde_json::Value,
}

impl Credentials {
    pub fn new(blob: serde_json::Value) -> Self {
        Self { blob }
    }
}

/// Raw events a live connection pushes at its supervisor.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A fresh pairing artifact; each one replaces the previous.
    PairingCode { code: String },
    /// The connection is live.
    Connected { device: Option<String> },
    /// The provider rotated the stored credentials; persist them.
    CredentialsRotated(Credentials),
    /// Connection lost. `terminal` distinguishes revoked credentials and
    /// explicit logout from recoverable transport failures.
    Disconnected { reason: String, terminal: bool },
    /// Explicit logout from another device.
    LoggedOut,
    Message(IncomingMessage),
    Ack(MessageAck),
    GroupUpdate(GroupUpdate),
    Presence(PresenceUpdate),
}

/// Duplex connection primitive for one messaging provider.
///
/// One shared client instance serves every tenant; calls are tenant-scoped.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open (or re-open) the tenant's connection. With no credentials the
    /// provider starts a pairing flow and emits [`ClientEvent::PairingCode`]s.
    /// The returned stream ends when the connection dies.
    async fn connect(
        &self,
        tenant: &str,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<mpsc::Receiver<ClientEvent>>;

    /// Send a text message; returns the provider's message id.
    async fn send_text(&self, tenant: &str, recipient: &str, body: &str) -> anyhow::Result<String>;

    /// Close the tenant's connection, if any.
    async fn close(&self, tenant: &str) -> anyhow::Result<()>;
}
