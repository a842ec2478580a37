//! Normalized event model and the per-tenant ordered event pipeline.
//!
//! Supervisors translate raw provider callbacks into [`NormalizedEvent`]s
//! exactly once; the [`pipeline::EventPipeline`] fans each event out to every
//! registered [`sink::EventSink`] in strict per-tenant order.

pub mod pipeline;
pub mod sink;
pub mod types;

pub use {
    pipeline::EventPipeline,
    sink::EventSink,
    types::{
        EventKind, EventPayload, GroupUpdate, IncomingMessage, MessageAck, NormalizedEvent,
        PresenceUpdate,
    },
};
