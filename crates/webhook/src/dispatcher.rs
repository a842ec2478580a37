//! Signed delivery with retries.

use std::{sync::Arc, time::Duration};

use {
    anyhow::anyhow,
    async_trait::async_trait,
    hmac::{Hmac, Mac},
    secrecy::ExposeSecret,
    serde::Serialize,
    sha2::Sha256,
    tracing::{debug, warn},
};

use {
    courier_common::{backoff::backoff_delay, now_ms},
    courier_events::{EventKind, EventPayload, EventSink, NormalizedEvent},
};

use crate::{
    delivery::{DeliveryLog, DeliveryOutcome, DeliveryRecord},
    subscription::{SubscriptionStore, WebhookSubscription},
};

pub const SIGNATURE_HEADER: &str = "X-Courier-Signature";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub request_timeout: Duration,
    /// Total attempts per event and subscription, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// What subscribers receive, serialized once per event.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryPayload<'a> {
    event_kind: &'a str,
    tenant_key: &'a str,
    sequence: u64,
    payload: &'a EventPayload,
    timestamp: u64,
}

/// HMAC-SHA256 of the raw request body, hex-encoded.
pub fn sign_body(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow!("invalid signing key"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// [`EventSink`] that fans events out to matching webhook subscriptions.
///
/// Each subscription gets its own delivery task, so one slow or broken
/// endpoint never stalls the pipeline or other subscribers. Permanent
/// failure after the attempt ceiling is recorded, not propagated.
pub struct WebhookDispatcher {
    config: DispatcherConfig,
    http: reqwest::Client,
    subscriptions: Arc<dyn SubscriptionStore>,
    log: Arc<dyn DeliveryLog>,
}

impl WebhookDispatcher {
    pub fn new(
        config: DispatcherConfig,
        subscriptions: Arc<dyn SubscriptionStore>,
        log: Arc<dyn DeliveryLog>,
    ) -> anyhow::Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Arc::new(Self {
            config,
            http,
            subscriptions,
            log,
        }))
    }
}

#[async_trait]
impl EventSink for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()> {
        let kind = event.kind();
        let matching: Vec<WebhookSubscription> = self
            .subscriptions
            .list()
            .await?
            .into_iter()
            .filter(|s| s.matches(&event.tenant, kind))
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        let body = Arc::new(serde_json::to_vec(&DeliveryPayload {
            event_kind: kind.as_str(),
            tenant_key: &event.tenant,
            sequence: event.sequence,
            payload: &event.payload,
            timestamp: event.at_ms,
        })?);

        for subscription in matching {
            tokio::spawn(deliver_with_retries(
                self.http.clone(),
                self.config.clone(),
                Arc::clone(&self.log),
                subscription,
                Arc::clone(&body),
                event.tenant.clone(),
                kind,
                event.sequence,
            ));
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn deliver_with_retries(
    http: reqwest::Client,
    config: DispatcherConfig,
    log: Arc<dyn DeliveryLog>,
    subscription: WebhookSubscription,
    body: Arc<Vec<u8>>,
    tenant: String,
    kind: EventKind,
    sequence: u64,
) {
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            let delay = backoff_delay(config.base_delay, config.max_delay, attempt - 1);
            tokio::time::sleep(delay).await;
        }

        let outcome = attempt_delivery(&http, &subscription, &body).await;
        let delivered = outcome.is_delivered();
        let record = DeliveryRecord {
            subscription_id: subscription.id.clone(),
            tenant: tenant.clone(),
            kind,
            sequence,
            attempt: attempt + 1,
            outcome,
            at_ms: now_ms(),
        };
        if let Err(e) = log.record(record).await {
            warn!(subscription_id = %subscription.id, error = %e, "failed to record delivery attempt");
        }

        if delivered {
            debug!(
                subscription_id = %subscription.id,
                tenant,
                sequence,
                attempt = attempt + 1,
                "webhook delivered"
            );
            return;
        }
    }
    warn!(
        subscription_id = %subscription.id,
        tenant,
        sequence,
        attempts = config.max_attempts,
        "webhook delivery gave up"
    );
}

async fn attempt_delivery(
    http: &reqwest::Client,
    subscription: &WebhookSubscription,
    body: &[u8],
) -> DeliveryOutcome {
    let signature = match sign_body(subscription.secret.expose_secret(), body) {
        Ok(signature) => signature,
        Err(e) => {
            return DeliveryOutcome::Failed {
                reason: e.to_string(),
            };
        },
    };

    let result = http
        .post(&subscription.url)
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, format!("sha256={signature}"))
        .body(body.to_vec())
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered {
            status: response.status().as_u16(),
        },
        Ok(response) => DeliveryOutcome::Failed {
            reason: format!("status {}", response.status().as_u16()),
        },
        Err(e) => DeliveryOutcome::Failed {
            reason: e.to_string(),
        },
    }
}
