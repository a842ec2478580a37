//! Deferred message delivery.
//!
//! Messages are stored with a due time and a status machine
//! (`Pending → Sending → Sent | Failed`); a tick worker claims due rows
//! with a compare-and-set so concurrent ticks never double-send.

pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;
pub mod worker;

pub use {
    store::ScheduleStore,
    store_memory::MemoryScheduleStore,
    store_sqlite::{SqliteScheduleStore, run_migrations},
    types::{ScheduleStatus, ScheduledMessage},
    worker::{ScheduledSendWorker, WorkerConfig},
};
