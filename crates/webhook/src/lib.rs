//! Signed webhook fan-out for normalized events.
//!
//! Subscriptions select events by tenant and kind; the dispatcher posts
//! each matching event as signed JSON and records every delivery attempt.

pub mod delivery;
pub mod dispatcher;
pub mod subscription;

pub use {
    delivery::{DeliveryLog, DeliveryOutcome, DeliveryRecord, MemoryDeliveryLog},
    dispatcher::{DispatcherConfig, SIGNATURE_HEADER, WebhookDispatcher, sign_body},
    subscription::{MemorySubscriptionStore, SubscriptionStore, WebhookSubscription},
};
