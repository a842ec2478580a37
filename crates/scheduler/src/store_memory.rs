//! In-memory schedule store.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    store::ScheduleStore,
    types::{ScheduleStatus, ScheduledMessage},
};

/// No persistence; for tests and single-process setups that accept losing
/// the schedule on restart.
#[derive(Default)]
pub struct MemoryScheduleStore {
    entries: Mutex<HashMap<String, ScheduledMessage>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn insert(&self, message: ScheduledMessage) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(message.id.clone(), message);
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<ScheduledMessage>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(id).cloned())
    }

    async fn list(&self, tenant: Option<&str>) -> anyhow::Result<Vec<ScheduledMessage>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<ScheduledMessage> = entries
            .values()
            .filter(|m| tenant.is_none_or(|t| m.tenant == t))
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.due_at_ms);
        Ok(rows)
    }

    async fn due(&self, now_ms: u64) -> anyhow::Result<Vec<ScheduledMessage>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<ScheduledMessage> = entries
            .values()
            .filter(|m| m.status == ScheduleStatus::Pending && m.due_at_ms <= now_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.due_at_ms);
        Ok(rows)
    }

    async fn claim(&self, id: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(id) {
            Some(message) if message.status == ScheduleStatus::Pending => {
                message.status = ScheduleStatus::Sending;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn mark_sent(&self, id: &str, sent_at_ms: u64) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = entries.get_mut(id) {
            message.status = ScheduleStatus::Sent;
            message.sent_at_ms = Some(sent_at_ms);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = entries.get_mut(id) {
            message.status = ScheduleStatus::Failed;
            message.error = Some(error.to_string());
        }
        Ok(())
    }
}
