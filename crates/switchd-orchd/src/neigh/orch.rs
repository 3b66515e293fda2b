//! NeighOrch implementation.

use super::types::{NeighborEntry, NextHopEntry, NextHopFlags, NextHopKey};
use crate::crm::{CrmResource, SharedCrm};
use crate::intfs::RifRegistry;
use crate::ports::PortsView;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use switchd_hal::{NextHopOid, SwitchHal};
use switchd_orch_common::{
    ChangeFeed, Consumer, ConsumerConfig, FdbFlushUpdate, HasRefCount, KeyOpFieldsValues,
    NeighborUpdate, Operation, Orch, PortOperUpdate, RecordSink, SharedFanout, SubjectType,
    SubjectUpdate, SyncMap, SyncMapError, TaskError, TaskResult, TaskResultExt, TaskStatus,
};
use switchd_types::{IpAddress, MacAddress};

/// Host interfaces whose neighbors never reach hardware.
const SKIPPED_ALIASES: [&str; 3] = ["eth0", "lo", "docker0"];

/// Configuration for NeighOrch.
#[derive(Debug, Clone)]
pub struct NeighOrchConfig {
    /// Table this orch consumes.
    pub table_name: String,
}

impl Default for NeighOrchConfig {
    fn default() -> Self {
        Self {
            table_name: "NEIGH_TABLE".to_string(),
        }
    }
}

/// External edges of the neighbor orchestrator: the routing layer's
/// forwarding-group membership, and the kernel neighbor table.
pub trait NeighOrchCallbacks: Send + Sync {
    /// Excludes a next-hop from the forwarding groups it belongs to.
    /// Returns false if the routing layer could not apply the change.
    fn invalidate_next_hop(&self, nexthop: &NextHopKey) -> bool;

    /// Re-admits a next-hop into forwarding-group membership.
    fn validate_next_hop(&self, nexthop: &NextHopKey) -> bool;

    /// Sends a best-effort "delete neighbor" message to the kernel.
    /// Returns false if the notification channel is unavailable.
    fn flush_kernel_neighbor(&self, alias: &str, ip: &IpAddress, mac: &MacAddress) -> bool;
}

/// Neighbor and next-hop orchestrator.
///
/// Tracks resolved neighbors and their paired next-hops. Router interfaces
/// are referenced (never owned) through the interface orchestrator's
/// [`RifRegistry`]; the routing layer holds next-hop references through the
/// public increase/decrease calls, which gate deletion.
pub struct NeighOrch {
    config: NeighOrchConfig,
    consumer: Consumer,
    feed: Box<dyn ChangeFeed>,
    neighbors: SyncMap<NeighborEntry, MacAddress>,
    next_hops: SyncMap<NextHopKey, NextHopEntry>,
    ports: PortsView,
    rifs: RifRegistry,
    hal: Arc<dyn SwitchHal>,
    crm: SharedCrm,
    fanout: SharedFanout,
    callbacks: Arc<dyn NeighOrchCallbacks>,
}

impl NeighOrch {
    pub fn new(
        config: NeighOrchConfig,
        feed: Box<dyn ChangeFeed>,
        ports: PortsView,
        rifs: RifRegistry,
        hal: Arc<dyn SwitchHal>,
        crm: SharedCrm,
        fanout: SharedFanout,
        callbacks: Arc<dyn NeighOrchCallbacks>,
    ) -> Self {
        {
            let mut fanout = fanout.lock().unwrap();
            fanout.subscribe(SubjectType::FdbChange, "NeighOrch");
            fanout.subscribe(SubjectType::PortOperChange, "NeighOrch");
        }
        let consumer = Consumer::new(ConsumerConfig::new(config.table_name.clone()));
        Self {
            config,
            consumer,
            feed,
            neighbors: SyncMap::new(),
            next_hops: SyncMap::new(),
            ports,
            rifs,
            hal,
            crm,
            fanout,
            callbacks,
        }
    }

    // Read surface for the routing layer.

    pub fn has_next_hop(&self, nexthop: &NextHopKey) -> bool {
        self.next_hops.contains_key(nexthop)
    }

    pub fn next_hop_id(&self, nexthop: &NextHopKey) -> Option<NextHopOid> {
        self.next_hops.get(nexthop).map(|entry| entry.id)
    }

    pub fn next_hop_ref_count(&self, nexthop: &NextHopKey) -> Option<u32> {
        self.next_hops.ref_count(nexthop)
    }

    /// Records a routing-layer reference to a next-hop.
    pub fn increase_next_hop_ref_count(
        &mut self,
        nexthop: &NextHopKey,
    ) -> Result<u32, SyncMapError> {
        self.next_hops.increment_ref(nexthop)
    }

    /// Releases a routing-layer reference.
    pub fn decrease_next_hop_ref_count(
        &mut self,
        nexthop: &NextHopKey,
    ) -> Result<u32, SyncMapError> {
        self.next_hops.decrement_ref(nexthop)
    }

    pub fn is_next_hop_flag_set(&self, nexthop: &NextHopKey, flag: NextHopFlags) -> bool {
        self.next_hops
            .get(nexthop)
            .map(|entry| entry.flags.contains(flag))
            .unwrap_or(false)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Forwards every ingested record to a write-only sink.
    pub fn set_recorder(&mut self, recorder: Arc<dyn RecordSink>) {
        self.consumer.set_recorder(recorder);
    }

    /// Looks a neighbor up by resolved address and interface.
    pub fn neighbor_mac(&self, entry: &NeighborEntry) -> Option<MacAddress> {
        self.neighbors.get(entry).copied()
    }

    // Flag handling.

    /// Sets a flag on a next-hop, mirroring `IF_DOWN` to the routing layer.
    ///
    /// Returns whether the flag actually transitioned; setting an
    /// already-set flag is a successful no-op and triggers no second
    /// routing-layer call.
    pub fn set_next_hop_flag(
        &mut self,
        nexthop: &NextHopKey,
        flag: NextHopFlags,
    ) -> TaskResult<bool> {
        {
            let entry = self.next_hops.get_mut(nexthop).ok_or_else(|| {
                TaskError::need_retry(format!("unknown next hop {}", nexthop))
            })?;
            if entry.flags.contains(flag) {
                return Ok(false);
            }
            entry.flags.insert(flag);
        }
        if flag == NextHopFlags::IF_DOWN && !self.callbacks.invalidate_next_hop(nexthop) {
            warn!("Failed to invalidate next hop {}", nexthop);
        }
        Ok(true)
    }

    /// Clears a flag on a next-hop; symmetric with
    /// [`NeighOrch::set_next_hop_flag`].
    pub fn clear_next_hop_flag(
        &mut self,
        nexthop: &NextHopKey,
        flag: NextHopFlags,
    ) -> TaskResult<bool> {
        {
            let entry = self.next_hops.get_mut(nexthop).ok_or_else(|| {
                TaskError::need_retry(format!("unknown next hop {}", nexthop))
            })?;
            if !entry.flags.contains(flag) {
                return Ok(false);
            }
            entry.flags.remove(flag);
        }
        if flag == NextHopFlags::IF_DOWN && !self.callbacks.validate_next_hop(nexthop) {
            warn!("Failed to validate next hop {}", nexthop);
        }
        Ok(true)
    }

    // Lifecycle.

    /// Resolves a neighbor: creates the hardware binding and its paired
    /// next-hop, or rewrites the MAC of an existing binding in place.
    pub fn add_neighbor(&mut self, entry: &NeighborEntry, mac: MacAddress) -> TaskResult<()> {
        let rif_id = self
            .rifs
            .router_intf_id(&entry.alias)
            .ok_or_else(|| TaskError::waiting_for(format!("INTF_TABLE:{}", entry.alias)))?;

        if self.neighbors.get(entry).is_none() {
            match self.hal.create_neighbor(rif_id, &entry.ip, &mac) {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    // Raced with existing hardware state; nothing to retry
                    error!("Entry exists: neighbor {} on {}, rv:{}", mac, entry.alias, e);
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        "Failed to create neighbor {} on {}, rv:{}",
                        mac, entry.alias, e
                    );
                    return Err(TaskError::hal_error(format!(
                        "neighbor create failed for {}: {}",
                        entry, e
                    )));
                }
            }
            info!("Created neighbor {} on {}", mac, entry.alias);

            if let Err(e) = self.rifs.increase_ref_count(&entry.alias) {
                error!("Interface {} ref count: {}", entry.alias, e);
            }
            self.crm
                .lock()
                .unwrap()
                .inc_res_used(CrmResource::neighbor_for(&entry.ip));

            if let Err(e) = self.add_next_hop(entry.ip, &entry.alias) {
                // Unwind the neighbor so no half-built pair survives
                match self.hal.remove_neighbor(rif_id, &entry.ip) {
                    Ok(()) => {}
                    Err(rollback_err) if rollback_err.is_not_found() => {}
                    Err(rollback_err) => {
                        error!(
                            "Failed to remove neighbor {} on {}, rv:{}",
                            mac, entry.alias, rollback_err
                        );
                        return Err(e);
                    }
                }
                if let Err(ref_err) = self.rifs.decrease_ref_count(&entry.alias) {
                    error!("Interface {} ref count: {}", entry.alias, ref_err);
                }
                self.crm
                    .lock()
                    .unwrap()
                    .dec_res_used(CrmResource::neighbor_for(&entry.ip));
                return Err(e);
            }
        } else {
            // Re-resolution with a different MAC rewrites in place
            if let Err(e) = self.hal.set_neighbor_mac(rif_id, &entry.ip, &mac) {
                error!(
                    "Failed to update neighbor {} on {}, rv:{}",
                    mac, entry.alias, e
                );
                return Err(TaskError::hal_error(format!(
                    "neighbor update failed for {}: {}",
                    entry, e
                )));
            }
            info!("Updated neighbor {} on {}", mac, entry.alias);
        }

        self.neighbors.insert(entry.clone(), mac);
        self.fanout
            .lock()
            .unwrap()
            .notify(SubjectUpdate::Neighbor(NeighborUpdate {
                ip: entry.ip,
                alias: entry.alias.clone(),
                mac: Some(mac),
                added: true,
            }));

        Ok(())
    }

    /// Removes a neighbor and its paired next-hop, next-hop first.
    ///
    /// Refused while the next-hop is referenced. A next-hop that is already
    /// gone from hardware is tolerated; its accounting decrement is skipped
    /// so the counters keep tracking the true hardware count.
    pub fn remove_neighbor(&mut self, entry: &NeighborEntry) -> TaskResult<()> {
        let Some(mac) = self.neighbors.get(entry).copied() else {
            return Ok(());
        };
        let nexthop = entry.next_hop_key();

        if self.next_hop_ref_count(&nexthop).unwrap_or(0) > 0 {
            info!(
                "Failed to remove still referenced neighbor {} on {}",
                mac, entry.alias
            );
            return Err(TaskError::need_retry(format!(
                "next hop {} still referenced",
                nexthop
            )));
        }

        let rif_id = self
            .rifs
            .router_intf_id(&entry.alias)
            .ok_or_else(|| TaskError::need_retry(format!("INTF_TABLE:{}", entry.alias)))?;

        if let Some(nh_entry) = self.next_hops.get(&nexthop) {
            let nh_id = nh_entry.id;
            match self.hal.remove_next_hop(nh_id) {
                Ok(()) => {
                    self.crm
                        .lock()
                        .unwrap()
                        .dec_res_used(CrmResource::next_hop_for(&entry.ip));
                    info!("Removed next hop {}", nexthop);
                }
                Err(e) if e.is_not_found() => {
                    // Already gone; continue with the neighbor itself
                    error!("Failed to locate next hop {}, rv:{}", nexthop, e);
                }
                Err(e) => {
                    error!("Failed to remove next hop {}, rv:{}", nexthop, e);
                    return Err(TaskError::hal_error(format!(
                        "next hop remove failed for {}: {}",
                        nexthop, e
                    )));
                }
            }
        }

        match self.hal.remove_neighbor(rif_id, &entry.ip) {
            Ok(()) => {
                self.crm
                    .lock()
                    .unwrap()
                    .dec_res_used(CrmResource::neighbor_for(&entry.ip));
            }
            Err(e) if e.is_not_found() => {
                error!("Failed to locate neighbor {} on {}, rv:{}", mac, entry.alias, e);
            }
            Err(e) => {
                error!(
                    "Failed to remove neighbor {} on {}, rv:{}",
                    mac, entry.alias, e
                );
                return Err(TaskError::hal_error(format!(
                    "neighbor remove failed for {}: {}",
                    entry, e
                )));
            }
        }
        info!("Removed neighbor {} on {}", mac, entry.alias);

        self.neighbors.remove(entry);
        if let Err(e) = self.rifs.decrease_ref_count(&entry.alias) {
            error!("Interface {} ref count: {}", entry.alias, e);
        }
        self.fanout
            .lock()
            .unwrap()
            .notify(SubjectUpdate::Neighbor(NeighborUpdate {
                ip: entry.ip,
                alias: entry.alias.clone(),
                mac: None,
                added: false,
            }));

        self.remove_next_hop(&nexthop)?;
        Ok(())
    }

    /// Creates the next-hop paired with a freshly resolved neighbor.
    fn add_next_hop(&mut self, ip: IpAddress, alias: &str) -> TaskResult<()> {
        let port = self
            .ports
            .get(alias)
            .ok_or_else(|| TaskError::waiting_for(format!("PORT_TABLE:{}", alias)))?;
        let nexthop = NextHopKey::new(ip, alias);
        if self.next_hops.contains_key(&nexthop) {
            return Ok(());
        }

        let rif_id = self
            .rifs
            .router_intf_id(alias)
            .ok_or_else(|| TaskError::waiting_for(format!("INTF_TABLE:{}", alias)))?;

        let nh_id = match self.hal.create_next_hop(rif_id, &ip) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to create next hop {} on {}, rv:{}", ip, alias, e);
                return Err(TaskError::hal_error(format!(
                    "next hop create failed for {}: {}",
                    nexthop, e
                )));
            }
        };
        info!("Created next hop {} on {}", ip, alias);

        self.next_hops.insert(nexthop.clone(), NextHopEntry::new(nh_id));
        if let Err(e) = self.rifs.increase_ref_count(alias) {
            error!("Interface {} ref count: {}", alias, e);
        }
        self.crm
            .lock()
            .unwrap()
            .inc_res_used(CrmResource::next_hop_for(&ip));

        // A buffered resolution can execute after its port already went
        // down; the new next-hop starts out excluded from forwarding
        if !port.oper_up {
            match self.set_next_hop_flag(&nexthop, NextHopFlags::IF_DOWN) {
                Ok(_) => {}
                Err(e) => warn!(
                    "Failed to set IF_DOWN on next hop {} for {}: {}",
                    ip, alias, e
                ),
            }
        }
        Ok(())
    }

    /// Drops the bookkeeping of an unreferenced next-hop. The hardware
    /// object is removed by [`NeighOrch::remove_neighbor`].
    fn remove_next_hop(&mut self, nexthop: &NextHopKey) -> TaskResult<()> {
        let Some(entry) = self.next_hops.get(nexthop) else {
            return Ok(());
        };
        if entry.ref_count() > 0 {
            error!("Failed to remove still referenced next hop {}", nexthop);
            return Err(TaskError::need_retry(format!(
                "next hop {} still referenced",
                nexthop
            )));
        }
        self.next_hops.remove(nexthop);
        if let Err(e) = self.rifs.decrease_ref_count(&nexthop.alias) {
            error!("Interface {} ref count: {}", nexthop.alias, e);
        }
        Ok(())
    }

    // Topology event handling.

    /// Applies a port operational state transition: `IF_DOWN` flags are
    /// mirrored per next-hop (idempotently), and neighbors over a downed
    /// interface are kernel-flushed once per transition.
    fn handle_port_oper_update(&mut self, update: &PortOperUpdate) {
        let keys: Vec<NextHopKey> = self
            .next_hops
            .keys()
            .filter(|key| key.alias == update.alias)
            .cloned()
            .collect();

        for key in keys {
            let transitioned = if update.oper_up {
                self.clear_next_hop_flag(&key, NextHopFlags::IF_DOWN)
            } else {
                self.set_next_hop_flag(&key, NextHopFlags::IF_DOWN)
            };
            match transitioned {
                Ok(true) if !update.oper_up => {
                    let entry = NeighborEntry::new(key.ip, key.alias.clone());
                    if let Some(mac) = self.neighbors.get(&entry).copied() {
                        self.flush_kernel(&entry, &mac);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Next hop {} flag update failed: {}", key, e),
            }
        }
    }

    /// Applies a forwarding-table entry removal: every resolved neighbor
    /// sharing the MAC and ingress VLAN is flushed.
    fn handle_fdb_update(&mut self, update: &FdbFlushUpdate) {
        if update.added {
            return;
        }
        if update.port_up {
            debug!(
                "Port {} is up; {} is an aged entry, not flushing",
                update.port_alias, update.mac
            );
            return;
        }

        let matches: Vec<(NeighborEntry, MacAddress)> = self
            .neighbors
            .iter()
            .filter(|(entry, mac)| entry.alias == update.vlan_alias && **mac == update.mac)
            .map(|(entry, mac)| (entry.clone(), *mac))
            .collect();

        for (entry, mac) in matches {
            info!(
                "Flushing neighbor {} as FDB entry {} is flushed",
                entry, mac
            );
            self.flush_kernel(&entry, &mac);

            // Hardware removal only while nothing references the pair;
            // otherwise the kernel-side delete feeds back through the
            // change stream and the guarded removal path finishes the job
            if self.next_hop_ref_count(&entry.next_hop_key()).unwrap_or(0) == 0 {
                if let Err(e) = self.remove_neighbor(&entry) {
                    warn!("Flush of neighbor {} incomplete: {}", entry, e);
                }
            } else {
                info!(
                    "Neighbor {} still referenced; flush deferred to reconciliation",
                    entry
                );
            }
        }
    }

    /// Best-effort kernel neighbor delete.
    fn flush_kernel(&self, entry: &NeighborEntry, mac: &MacAddress) {
        if !self
            .callbacks
            .flush_kernel_neighbor(&entry.alias, &entry.ip, mac)
        {
            error!("Failed to flush kernel neighbor {}", entry);
        }
    }

    // Backlog processing.

    fn process_entry(&mut self, task: &KeyOpFieldsValues) -> TaskResult<()> {
        let entry = parse_neigh_key(&task.key)?;

        if SKIPPED_ALIASES.contains(&entry.alias.as_str()) {
            return Ok(());
        }

        match task.op {
            Operation::Set => {
                if self.ports.get(&entry.alias).is_none() {
                    debug!("Port {} doesn't exist", entry.alias);
                    return Err(TaskError::waiting_for(format!(
                        "PORT_TABLE:{}",
                        entry.alias
                    )));
                }
                if self.rifs.router_intf_id(&entry.alias).is_none() {
                    debug!("Router interface doesn't exist on {}", entry.alias);
                    return Err(TaskError::waiting_for(format!(
                        "INTF_TABLE:{}",
                        entry.alias
                    )));
                }

                let mac: MacAddress = task
                    .get_field("neigh")
                    .ok_or_else(|| {
                        TaskError::invalid_entry(format!("missing neigh field on {}", task.key))
                    })?
                    .parse()
                    .map_err(|_| {
                        TaskError::invalid_entry(format!("bad MAC in {}", task.key))
                    })?;

                match self.neighbors.get(&entry) {
                    Some(existing) if *existing == mac => {
                        // Duplicate resolution; nothing to reapply
                        Ok(())
                    }
                    _ => self.add_neighbor(&entry, mac),
                }
            }
            Operation::Del => self.remove_neighbor(&entry),
        }
    }
}

#[async_trait]
impl Orch for NeighOrch {
    fn name(&self) -> &str {
        "NeighOrch"
    }

    fn priority(&self) -> i32 {
        15
    }

    fn ingest(&mut self) {
        let count = self.consumer.ingest_from(self.feed.as_mut());
        if count > 0 {
            debug!("NeighOrch: ingested {} records", count);
        }
    }

    async fn do_task(&mut self) -> TaskResult<()> {
        if !self.ports.all_ports_ready() {
            return Ok(());
        }

        for key in self.consumer.pending_keys() {
            while let Some(task) = self.consumer.front(&key).cloned() {
                let result = self.process_entry(&task);
                match result.to_status() {
                    status if status.is_resolved() => {
                        if status == TaskStatus::InvalidEntry {
                            if let Err(e) = &result {
                                error!("NeighOrch: dropping {}: {}", task.key, e);
                            }
                        }
                        self.consumer.remove_front(&key);
                    }
                    TaskStatus::Fatal => return result,
                    _ => {
                        if let Err(e) = &result {
                            debug!("NeighOrch: {} pending: {}", task.key, e);
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }

    fn on_subject_update(&mut self, update: &SubjectUpdate) {
        match update {
            SubjectUpdate::FdbFlush(fdb) => self.handle_fdb_update(fdb),
            SubjectUpdate::PortOper(port) => self.handle_port_oper_update(port),
            SubjectUpdate::Neighbor(_) => {}
        }
    }
}

/// Splits a neighbor key into interface alias and address.
///
/// Keys are `alias:ip`; the address may contain colons (IPv6), so only the
/// first separator splits.
fn parse_neigh_key(key: &str) -> TaskResult<NeighborEntry> {
    let (alias, ip_str) = key
        .split_once(':')
        .ok_or_else(|| TaskError::invalid_entry(format!("failed to parse key {}", key)))?;
    let ip: IpAddress = ip_str
        .parse()
        .map_err(|_| TaskError::invalid_entry(format!("bad address in key {}", key)))?;
    Ok(NeighborEntry::new(ip, alias))
}
