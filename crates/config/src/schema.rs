//! Config schema types.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use {courier_autoreply::ReplyConfig, courier_webhook::WebhookSubscription};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CourierConfig {
    pub gateway: GatewaySection,
    pub bridge: BridgeSection,
    pub session: SessionSection,
    pub scheduler: SchedulerSection,
    pub webhook: WebhookSection,
    /// Auto-reply settings keyed by tenant.
    pub autoreply: HashMap<String, ReplyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewaySection {
    pub bind: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeSection {
    pub url: String,
    pub command_timeout_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001".into(),
            command_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSection {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub send_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Where per-tenant credential files live.
    pub credentials_dir: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            base_delay_secs: 1,
            max_delay_secs: 30,
            send_timeout_secs: 10,
            connect_timeout_secs: 30,
            credentials_dir: "./data/credentials".into(),
        }
    }
}

impl SessionSection {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerSection {
    pub tick_secs: u64,
    /// SQLite URL for the schedule. `None` keeps the schedule in memory.
    pub database_url: Option<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_secs: 15,
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookSection {
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub base_delay_secs: u64,
    pub subscriptions: Vec<WebhookSubscription>,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            request_timeout_secs: 10,
            base_delay_secs: 1,
            subscriptions: Vec::new(),
        }
    }
}
