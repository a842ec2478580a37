//! Per-tenant rule configuration storage.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::rules::ReplyConfig;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn config_for(&self, tenant: &str) -> anyhow::Result<Option<ReplyConfig>>;
    async fn set_config(&self, tenant: &str, config: ReplyConfig) -> anyhow::Result<()>;
    async fn remove(&self, tenant: &str) -> anyhow::Result<bool>;
}

#[derive(Default)]
pub struct MemoryRuleStore {
    entries: Mutex<HashMap<String, ReplyConfig>>,
}

impl MemoryRuleStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn config_for(&self, tenant: &str) -> anyhow::Result<Option<ReplyConfig>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(tenant).cloned())
    }

    async fn set_config(&self, tenant: &str, config: ReplyConfig) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(tenant.to_string(), config);
        Ok(())
    }

    async fn remove(&self, tenant: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(tenant).is_some())
    }
}
