//! Webhook subscriptions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use courier_events::EventKind;

/// A registered webhook endpoint.
///
/// `tenant: None` subscribes to every tenant. An empty `kinds` set
/// subscribes to every event kind. The signing secret never serializes.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    #[serde(default = "random_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: Secret<String>,
    #[serde(default)]
    pub kinds: Vec<EventKind>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn random_id() -> String {
    Uuid::new_v4().to_string()
}

impl WebhookSubscription {
    pub fn new(tenant: Option<String>, url: String, secret: Secret<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant,
            url,
            secret,
            kinds: Vec::new(),
            active: true,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Whether this subscription wants an event for `tenant` of `kind`.
    #[must_use]
    pub fn matches(&self, tenant: &str, kind: EventKind) -> bool {
        if !self.active {
            return false;
        }
        if self.tenant.as_deref().is_some_and(|t| t != tenant) {
            return false;
        }
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

impl std::fmt::Debug for WebhookSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSubscription")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("url", &self.url)
            .field("kinds", &self.kinds)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Durable subscription storage.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: WebhookSubscription) -> anyhow::Result<()>;
    async fn remove(&self, id: &str) -> anyhow::Result<bool>;
    async fn list(&self) -> anyhow::Result<Vec<WebhookSubscription>>;
    async fn set_active(&self, id: &str, active: bool) -> anyhow::Result<bool>;
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    entries: Mutex<HashMap<String, WebhookSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn insert(&self, subscription: WebhookSubscription) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(subscription.id.clone(), subscription);
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(id).is_some())
    }

    async fn list(&self) -> anyhow::Result<Vec<WebhookSubscription>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.values().cloned().collect())
    }

    async fn set_active(&self, id: &str, active: bool) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(id) {
            Some(subscription) => {
                subscription.active = active;
                Ok(true)
            },
            None => Ok(false),
        }
    }
}
