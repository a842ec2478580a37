//! Connection lifecycle for tenant sessions.
//!
//! One [`supervisor::ConnectionSupervisor`] task per tenant owns the
//! provider connection state machine; the [`registry::SessionRegistry`]
//! enforces at-most-one supervisor per tenant key and is the only shared
//! mutable structure on the outbound path.

pub mod client;
pub mod credentials;
pub mod error;
pub mod outbound;
pub mod registry;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testutil;

pub use {
    client::{ClientEvent, Credentials, ProtocolClient},
    credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    error::SendError,
    outbound::dispatch_job,
    registry::SessionRegistry,
    supervisor::{ConnectionSupervisor, SupervisorConfig, TenantSession},
};
