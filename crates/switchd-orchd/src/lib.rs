//! switchd orchestration daemon.
//!
//! The daemon reconciles declarative intent, written into the interface and
//! neighbor tables by the configuration and sync layers, into hardware state
//! behind the [`switchd_hal::SwitchHal`] boundary, and keeps the two in
//! agreement under churn and partial failure.
//!
//! # Architecture
//!
//! ```text
//! [table feeds] ──> [OrchDaemon] ──> IntfsOrch ──┐
//!                        │          NeighOrch ───┼──> [SwitchHal]
//!                        │                       │
//!                 [EventFanout] <── topology ────┘
//! ```
//!
//! - [`daemon::OrchDaemon`]: the dispatch loop
//! - [`intfs::IntfsOrch`]: router-interface lifecycle
//! - [`neigh::NeighOrch`]: neighbor and next-hop lifecycle
//! - [`crm`]: hardware resource accounting
//! - [`flex_counter`]: per-object counter registration
//! - [`ports`]: read surface of the external port manager
//! - [`context`]: wiring for the external VRF/routing/kernel edges

pub mod context;
pub mod crm;
pub mod daemon;
pub mod flex_counter;
pub mod intfs;
pub mod neigh;
pub mod ports;

pub use context::SwitchContext;
pub use crm::{CrmMonitorOrch, CrmOrch, CrmResource, SharedCrm};
pub use daemon::{OrchDaemon, OrchDaemonConfig};
pub use flex_counter::{CounterStore, MemoryCounterStore, RifCounterRegistrar};
pub use intfs::{IntfsOrch, IntfsOrchCallbacks, IntfsOrchConfig, RifRegistry};
pub use neigh::{NeighOrch, NeighOrchCallbacks, NeighOrchConfig, NextHopKey};
pub use ports::{PortBinding, PortInfo, PortsView};
