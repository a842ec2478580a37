//! WebSocket bridge to the provider sidecar.
//!
//! The sidecar owns the actual messaging-network protocol; this crate
//! speaks a small JSON frame protocol to it over one shared WebSocket and
//! exposes the result as a [`courier_session::ProtocolClient`].

pub mod client;
pub mod frames;

pub use {
    client::{BridgeClient, BridgeConfig},
    frames::{CommandFrame, EventFrame},
};
