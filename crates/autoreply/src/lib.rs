//! Rule-driven automatic replies to inbound messages.

pub mod engine;
pub mod rules;
pub mod store;

pub use {
    engine::AutoReplyEngine,
    rules::{MatchType, ReplyConfig, ReplyRule},
    store::{MemoryRuleStore, RuleStore},
};
