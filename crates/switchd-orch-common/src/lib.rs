//! Common orchestration abstractions for the switchd control plane.
//!
//! This crate provides the substrate every orchestration module is built on:
//!
//! - [`Consumer`]: per-table pending-task backlog with merge semantics
//! - [`ChangeFeed`]: the ordered change-stream boundary, with [`MemoryFeed`]
//!   as the in-process implementation
//! - [`Orch`]: the trait the dispatch loop drives
//! - [`EventFanout`]: subject/observer registry for topology notifications
//! - [`SyncMap`]: map that never auto-creates entries (safe ref counting)
//! - [`TaskStatus`] / [`TaskError`]: per-task outcome classification
//!
//! # Architecture
//!
//! The flow is event-driven and single-threaded:
//!
//! 1. Configuration and network state changes arrive on per-table feeds
//! 2. The dispatcher ingests each feed into its orch's backlog
//! 3. Handlers drain their backlogs front-to-front, leaving tasks whose
//!    dependencies are not yet met in place for the next cycle
//! 4. Topology events bypass the backlog through the fan-out registry

mod consumer;
mod feed;
mod observer;
mod orch;
mod record;
mod sync_map;
mod task;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use feed::{ChangeFeed, MemoryFeed};
pub use observer::{
    EventFanout, FdbFlushUpdate, NeighborUpdate, PortOperUpdate, SharedFanout, SubjectType,
    SubjectUpdate,
};
pub use orch::Orch;
pub use record::{LogRecorder, MemoryRecorder, RecordSink, TaskRecord};
pub use sync_map::{HasRefCount, SyncMap, SyncMapError};
pub use task::{TaskError, TaskResult, TaskResultExt, TaskStatus};
