//! Configuration loading.
//!
//! Config files: `courier.toml` or `courier.json`. Every section has
//! working defaults; an absent file yields a default config.

pub mod loader;
pub mod schema;

pub use {
    loader::{load_config, load_or_default},
    schema::{
        BridgeSection, CourierConfig, GatewaySection, SchedulerSection, SessionSection,
        WebhookSection,
    },
};
