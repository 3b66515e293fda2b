//! Per-object counter registration against the stats-collection service.
//!
//! Registration is split from object creation: a freshly created router
//! interface may not yet be visible in the hardware id-mapping layer the
//! stats poller reads, so [`crate::intfs::IntfsOrch`] parks new interfaces in
//! a pending set and registers them from the periodic timer once visibility
//! is confirmed.

mod registrar;
mod store;

pub use registrar::{
    FlexCounterGroupConfig, RifCounterRegistrar, StatsMode, RIF_STAT_COUNTER_GROUP, RIF_STAT_IDS,
};
pub use store::{CounterStore, MemoryCounterStore};
