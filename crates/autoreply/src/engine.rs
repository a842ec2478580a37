//! The auto-reply event sink.

use std::sync::Arc;

use {async_trait::async_trait, tracing::debug};

use {
    courier_common::{JobSource, OutboundJob},
    courier_events::{EventPayload, EventSink, NormalizedEvent},
    courier_session::{SessionRegistry, dispatch_job},
};

use crate::store::RuleStore;

/// Watches `MessageReceived` events and answers the first matching rule
/// through the shared outbound path.
///
/// At most one reply per inbound message. Dispatch failures are logged by
/// the outbound path and never propagated, so a broken session cannot
/// take the pipeline down.
pub struct AutoReplyEngine {
    registry: Arc<SessionRegistry>,
    rules: Arc<dyn RuleStore>,
}

impl AutoReplyEngine {
    pub fn new(registry: Arc<SessionRegistry>, rules: Arc<dyn RuleStore>) -> Arc<Self> {
        Arc::new(Self { registry, rules })
    }
}

#[async_trait]
impl EventSink for AutoReplyEngine {
    fn name(&self) -> &'static str {
        "auto-reply"
    }

    async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()> {
        let EventPayload::MessageReceived(message) = &event.payload else {
            return Ok(());
        };

        let Some(config) = self.rules.config_for(&event.tenant).await? else {
            return Ok(());
        };
        if !config.enabled {
            return Ok(());
        }
        // Owner mode: the owner's own messages echo back with from_me set;
        // answering them would reply to ourselves.
        if config.owner_mode && message.from_me {
            return Ok(());
        }

        let Some(rule) = config.first_match(&message.body) else {
            return Ok(());
        };

        debug!(
            tenant = %event.tenant,
            rule_id = %rule.id,
            chat = %message.chat,
            "auto-reply rule matched"
        );
        let job = OutboundJob::new(
            &event.tenant,
            &message.chat,
            &rule.response,
            JobSource::AutoReply,
        );
        let outcome = dispatch_job(&self.registry, &job).await;
        if !outcome.is_sent() {
            debug!(tenant = %event.tenant, ?outcome, "auto-reply not delivered");
        }
        Ok(())
    }
}
