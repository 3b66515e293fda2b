//! Router-interface counter registration.

use super::store::CounterStore;
use crate::intfs::RifType;
use log::debug;
use std::fmt;
use std::sync::Arc;
use switchd_hal::RouterInterfaceOid;

/// Counter group name for router-interface stats.
pub const RIF_STAT_COUNTER_GROUP: &str = "RIF_STAT_COUNTER";

/// Stat ids polled for every registered router interface.
pub const RIF_STAT_IDS: [&str; 8] = [
    "RIF_STAT_IN_PACKETS",
    "RIF_STAT_IN_OCTETS",
    "RIF_STAT_IN_ERROR_PACKETS",
    "RIF_STAT_IN_ERROR_OCTETS",
    "RIF_STAT_OUT_PACKETS",
    "RIF_STAT_OUT_OCTETS",
    "RIF_STAT_OUT_ERROR_PACKETS",
    "RIF_STAT_OUT_ERROR_OCTETS",
];

/// Group polling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsMode {
    #[default]
    Read,
    ReadAndClear,
}

impl fmt::Display for StatsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsMode::Read => write!(f, "STATS_MODE_READ"),
            StatsMode::ReadAndClear => write!(f, "STATS_MODE_READ_AND_CLEAR"),
        }
    }
}

/// Group-level polling configuration.
#[derive(Debug, Clone)]
pub struct FlexCounterGroupConfig {
    pub group: String,
    pub poll_interval_ms: u64,
    pub stats_mode: StatsMode,
}

impl Default for FlexCounterGroupConfig {
    fn default() -> Self {
        Self {
            group: RIF_STAT_COUNTER_GROUP.to_string(),
            poll_interval_ms: 1000,
            stats_mode: StatsMode::Read,
        }
    }
}

/// Registers and unregisters router-interface counters.
///
/// Group-level registration (poll interval, stats mode) happens once at
/// construction; per-interface registration is driven by the interface
/// orchestrator after the object becomes visible to the stats subsystem.
pub struct RifCounterRegistrar {
    store: Arc<dyn CounterStore>,
    config: FlexCounterGroupConfig,
}

impl RifCounterRegistrar {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_config(store, FlexCounterGroupConfig::default())
    }

    pub fn with_config(store: Arc<dyn CounterStore>, config: FlexCounterGroupConfig) -> Self {
        store.set_group(
            &config.group,
            vec![
                (
                    "POLL_INTERVAL".to_string(),
                    config.poll_interval_ms.to_string(),
                ),
                ("STATS_MODE".to_string(), config.stats_mode.to_string()),
            ],
        );
        Self { store, config }
    }

    fn counter_key(&self, rif_id: RouterInterfaceOid) -> String {
        format!("{}:{}", self.config.group, rif_id)
    }

    /// Registers an interface's counters and its name/type map entries.
    pub fn register_rif(&self, rif_id: RouterInterfaceOid, alias: &str, rif_type: RifType) {
        let id = rif_id.to_string();
        self.store.set_name_map(alias, &id);
        self.store.set_type_map(&id, rif_type.hal_type_name());

        let id_list = RIF_STAT_IDS.join(",");
        self.store.register(
            &self.counter_key(rif_id),
            vec![("RIF_COUNTER_ID_LIST".to_string(), id_list)],
        );
        debug!("Registered interface {} to flex counter", alias);
    }

    /// Unregisters an interface's counters and map entries.
    pub fn unregister_rif(&self, rif_id: RouterInterfaceOid, alias: &str) {
        let id = rif_id.to_string();
        self.store.del_name_map(alias);
        self.store.del_type_map(&id);
        self.store.unregister(&self.counter_key(rif_id));
        debug!("Unregistered interface {} from flex counter", alias);
    }
}
