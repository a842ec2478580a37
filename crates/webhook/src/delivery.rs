//! Per-attempt delivery records.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use courier_events::EventKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum DeliveryOutcome {
    #[serde(rename_all = "camelCase")]
    Delivered { status: u16 },
    #[serde(rename_all = "camelCase")]
    Failed { reason: String },
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// One delivery attempt for one subscription and event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub subscription_id: String,
    pub tenant: String,
    pub kind: EventKind,
    pub sequence: u64,
    /// 1-based attempt number.
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    pub at_ms: u64,
}

/// Where attempt records go. Recording must never fail a delivery.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn record(&self, record: DeliveryRecord) -> anyhow::Result<()>;
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<DeliveryRecord>>;
    async fn for_subscription(&self, subscription_id: &str)
    -> anyhow::Result<Vec<DeliveryRecord>>;
}

#[derive(Default)]
pub struct MemoryDeliveryLog {
    records: Mutex<Vec<DeliveryRecord>>,
}

impl MemoryDeliveryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DeliveryLog for MemoryDeliveryLog {
    async fn record(&self, record: DeliveryRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<DeliveryRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn for_subscription(
        &self,
        subscription_id: &str,
    ) -> anyhow::Result<Vec<DeliveryRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .iter()
            .filter(|r| r.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}
