//! HTTP gateway: session provisioning, outbound sends, scheduling, and a
//! realtime event feed for UI subscribers.

pub mod realtime;
pub mod routes;
pub mod service;
pub mod state;

pub use {
    realtime::RealtimePublisher,
    routes::router,
    service::{GatewayService, PairingInfo},
    state::GatewayState,
};
