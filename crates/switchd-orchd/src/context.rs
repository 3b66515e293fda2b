//! Wiring for the external edges of the orchestrators.
//!
//! The collaborators outside this daemon (the VRF manager, the routing
//! layer, the kernel netlink channel) are reached through one injected
//! [`SwitchContext`] implementing the orchestrators' callback traits, which
//! also makes every outbound call observable for the test suites.

use crate::intfs::IntfsOrchCallbacks;
use crate::neigh::{NeighOrchCallbacks, NextHopKey};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use switchd_hal::VirtualRouterOid;
use switchd_types::{IpAddress, MacAddress};

/// Concrete callback implementation backed by in-process registries.
pub struct SwitchContext {
    vrfs: Mutex<HashMap<String, VirtualRouterOid>>,
    vnets: Mutex<HashSet<String>>,
    invalidated: Mutex<Vec<String>>,
    validated: Mutex<Vec<String>>,
    kernel_flushes: Mutex<Vec<String>>,
    kernel_channel_up: Mutex<bool>,
}

impl SwitchContext {
    pub fn new() -> Self {
        Self {
            vrfs: Mutex::new(HashMap::new()),
            vnets: Mutex::new(HashSet::new()),
            invalidated: Mutex::new(Vec::new()),
            validated: Mutex::new(Vec::new()),
            kernel_flushes: Mutex::new(Vec::new()),
            kernel_channel_up: Mutex::new(true),
        }
    }

    /// Registers a provisioned VRF.
    pub fn add_vrf(&self, name: impl Into<String>, vrf_id: VirtualRouterOid) {
        self.vrfs.lock().unwrap().insert(name.into(), vrf_id);
    }

    /// Withdraws a VRF.
    pub fn remove_vrf(&self, name: &str) {
        self.vrfs.lock().unwrap().remove(name);
    }

    /// Registers a provisioned VNET.
    pub fn add_vnet(&self, name: impl Into<String>) {
        self.vnets.lock().unwrap().insert(name.into());
    }

    /// Simulates loss of the kernel notification channel.
    pub fn set_kernel_channel_up(&self, up: bool) {
        *self.kernel_channel_up.lock().unwrap() = up;
    }

    /// Next-hops the routing layer was told to exclude, in call order.
    pub fn invalidations(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    /// Next-hops the routing layer was told to re-admit, in call order.
    pub fn validations(&self) -> Vec<String> {
        self.validated.lock().unwrap().clone()
    }

    /// Kernel neighbor delete messages sent, in call order.
    pub fn kernel_flushes(&self) -> Vec<String> {
        self.kernel_flushes.lock().unwrap().clone()
    }
}

impl Default for SwitchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl IntfsOrchCallbacks for SwitchContext {
    fn vrf_exists(&self, name: &str) -> bool {
        self.vrfs.lock().unwrap().contains_key(name)
    }

    fn get_vrf_id(&self, name: &str) -> Option<VirtualRouterOid> {
        self.vrfs.lock().unwrap().get(name).copied()
    }

    fn vnet_exists(&self, name: &str) -> bool {
        self.vnets.lock().unwrap().contains(name)
    }
}

impl NeighOrchCallbacks for SwitchContext {
    fn invalidate_next_hop(&self, nexthop: &NextHopKey) -> bool {
        info!("Routing layer: invalidate next hop {}", nexthop);
        self.invalidated.lock().unwrap().push(nexthop.to_string());
        true
    }

    fn validate_next_hop(&self, nexthop: &NextHopKey) -> bool {
        info!("Routing layer: validate next hop {}", nexthop);
        self.validated.lock().unwrap().push(nexthop.to_string());
        true
    }

    fn flush_kernel_neighbor(&self, alias: &str, ip: &IpAddress, mac: &MacAddress) -> bool {
        if !*self.kernel_channel_up.lock().unwrap() {
            return false;
        }
        debug!("Kernel: delete neighbor {} {} on {}", ip, mac, alias);
        self.kernel_flushes
            .lock()
            .unwrap()
            .push(format!("{}|{}|{}", alias, ip, mac));
        true
    }
}
