//! IntfsOrch implementation.

use super::registry::RifRegistry;
use super::types::{IntfsEntry, PendingRifCounter, RifType};
use crate::crm::{CrmResource, SharedCrm};
use crate::flex_counter::RifCounterRegistrar;
use crate::ports::{PortInfo, PortsView, SUB_INTF_SEPARATOR};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use switchd_hal::{RifRequest, RouteTarget, RouterInterfaceOid, SwitchHal, VirtualRouterOid};
use switchd_orch_common::{
    ChangeFeed, Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, Orch, RecordSink,
    TaskError, TaskResult, TaskResultExt, TaskStatus,
};
use switchd_types::{IpAddress, IpPrefix, MacAddress, PortType};

/// Aliases tracked without hardware interfaces.
const LOOPBACK_PREFIX: &str = "Loopback";

/// Host interfaces that never reach hardware.
const SKIPPED_ALIASES: [&str; 2] = ["eth0", "docker0"];

const DEFAULT_MTU: u32 = 9100;

/// Configuration for IntfsOrch.
#[derive(Debug, Clone)]
pub struct IntfsOrchConfig {
    /// Table this orch consumes.
    pub table_name: String,
    /// The default virtual router.
    pub default_vrf: VirtualRouterOid,
    /// Source MAC programmed on created interfaces.
    pub src_mac: MacAddress,
}

impl IntfsOrchConfig {
    pub fn new(default_vrf: VirtualRouterOid, src_mac: MacAddress) -> Self {
        Self {
            table_name: "INTF_TABLE".to_string(),
            default_vrf,
            src_mac,
        }
    }
}

/// Queries IntfsOrch needs answered by external collaborators.
pub trait IntfsOrchCallbacks: Send + Sync {
    /// Returns true if the named VRF has been provisioned.
    fn vrf_exists(&self, name: &str) -> bool;

    /// Resolves a VRF name to its virtual router id.
    fn get_vrf_id(&self, name: &str) -> Option<VirtualRouterOid>;

    /// Returns true if the named VNET has been provisioned.
    fn vnet_exists(&self, name: &str) -> bool;
}

/// Fields carried by an interface table entry.
#[derive(Debug, Default)]
struct IntfFields {
    vrf_name: Option<String>,
    vnet_name: Option<String>,
    mtu: Option<u32>,
    admin_up: Option<bool>,
}

impl IntfFields {
    fn parse(entry: &KeyOpFieldsValues) -> Self {
        let mut fields = IntfFields::default();
        for (field, value) in &entry.fvs {
            match field.as_str() {
                "vrf_name" if !value.is_empty() => fields.vrf_name = Some(value.clone()),
                "vnet_name" if !value.is_empty() => fields.vnet_name = Some(value.clone()),
                "mtu" => match value.parse::<u32>() {
                    Ok(mtu) => fields.mtu = Some(mtu),
                    Err(_) => error!("Invalid mtu {} on {}", value, entry.key),
                },
                "admin_status" => match value.as_str() {
                    "up" => fields.admin_up = Some(true),
                    "down" => fields.admin_up = Some(false),
                    other => {
                        warn!("Unknown admin status {} on {}", other, entry.key);
                        fields.admin_up = Some(false);
                    }
                },
                _ => {}
            }
        }
        fields
    }
}

/// Router-interface orchestrator.
///
/// Owns the alias → interface graph and the hardware objects hanging off
/// it: the RIF itself, the ip2me self route per assigned prefix, and the
/// directed-broadcast neighbor binding on VLAN interfaces. Interface state
/// is exported read-only through [`RifRegistry`].
pub struct IntfsOrch {
    config: IntfsOrchConfig,
    consumer: Consumer,
    feed: Box<dyn ChangeFeed>,
    registry: RifRegistry,
    /// Alias → VNET binding; a bound alias cannot be torn down until the
    /// binding is withdrawn.
    vnet_intfs: HashMap<String, String>,
    /// Created interfaces awaiting counter registration.
    pending_counters: Vec<PendingRifCounter>,
    ports: PortsView,
    hal: Arc<dyn SwitchHal>,
    crm: SharedCrm,
    registrar: Arc<RifCounterRegistrar>,
    callbacks: Arc<dyn IntfsOrchCallbacks>,
}

impl IntfsOrch {
    pub fn new(
        config: IntfsOrchConfig,
        feed: Box<dyn ChangeFeed>,
        ports: PortsView,
        hal: Arc<dyn SwitchHal>,
        crm: SharedCrm,
        registrar: Arc<RifCounterRegistrar>,
        callbacks: Arc<dyn IntfsOrchCallbacks>,
    ) -> Self {
        let consumer = Consumer::new(ConsumerConfig::new(config.table_name.clone()));
        Self {
            config,
            consumer,
            feed,
            registry: RifRegistry::new(),
            vnet_intfs: HashMap::new(),
            pending_counters: Vec::new(),
            ports,
            hal,
            crm,
            registrar,
            callbacks,
        }
    }

    /// Returns the shared read/refcount accessor over the interface graph.
    pub fn registry(&self) -> RifRegistry {
        self.registry.clone()
    }

    /// Backlog access for tests and diagnostics.
    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    /// Forwards every ingested record to a write-only sink.
    pub fn set_recorder(&mut self, recorder: Arc<dyn RecordSink>) {
        self.consumer.set_recorder(recorder);
    }

    /// Number of interfaces still awaiting counter registration.
    pub fn pending_counter_count(&self) -> usize {
        self.pending_counters.len()
    }

    fn process_entry(&mut self, entry: &KeyOpFieldsValues) -> TaskResult<()> {
        let (alias, prefix) = parse_intf_key(&entry.key)?;

        if SKIPPED_ALIASES.contains(&alias.as_str()) {
            return Ok(());
        }

        let fields = IntfFields::parse(entry);
        let vrf_id = match &fields.vrf_name {
            Some(name) => {
                if !self.callbacks.vrf_exists(name) {
                    return Err(TaskError::waiting_for(format!("VRF_TABLE:{}", name)));
                }
                self.callbacks
                    .get_vrf_id(name)
                    .ok_or_else(|| TaskError::waiting_for(format!("VRF_TABLE:{}", name)))?
            }
            None => self.config.default_vrf,
        };

        match entry.op {
            Operation::Set => self.process_set(&alias, vrf_id, prefix.as_ref(), &fields),
            Operation::Del => self.process_del(&alias, prefix.as_ref()),
        }
    }

    fn process_set(
        &mut self,
        alias: &str,
        vrf_id: VirtualRouterOid,
        prefix: Option<&IpPrefix>,
        fields: &IntfFields,
    ) -> TaskResult<()> {
        if alias.starts_with(LOOPBACK_PREFIX) {
            return self.process_loopback_set(alias, vrf_id, prefix);
        }

        let port = match self.ports.get(alias) {
            Some(port) => port,
            None if alias.contains(SUB_INTF_SEPARATOR) => self
                .ports
                .add_sub_port(
                    alias,
                    fields.admin_up.unwrap_or(true),
                    fields.mtu.unwrap_or(DEFAULT_MTU),
                )
                .ok_or_else(|| TaskError::waiting_for(format!("PORT_TABLE:{}", alias)))?,
            None => return Err(TaskError::waiting_for(format!("PORT_TABLE:{}", alias))),
        };

        if let Some(vnet) = &fields.vnet_name {
            if !self.callbacks.vnet_exists(vnet) {
                return Err(TaskError::waiting_for(format!("VNET_TABLE:{}", vnet)));
            }
            self.vnet_intfs.insert(alias.to_string(), vnet.clone());
        }

        self.set_intf(alias, vrf_id, prefix, fields, &port)
    }

    fn process_loopback_set(
        &mut self,
        alias: &str,
        vrf_id: VirtualRouterOid,
        prefix: Option<&IpPrefix>,
    ) -> TaskResult<()> {
        match prefix {
            None => {
                if !self.registry.contains(alias) {
                    self.registry.insert(
                        alias.to_string(),
                        IntfsEntry::new(RouterInterfaceOid::NULL, RifType::Loopback, vrf_id),
                    );
                    info!("Tracking loopback interface {}", alias);
                }
                Ok(())
            }
            Some(prefix) => {
                let entry = self
                    .registry
                    .get(alias)
                    .ok_or_else(|| TaskError::waiting_for(format!("INTF_TABLE:{}", alias)))?;
                if !entry.ip_addresses.contains(prefix) {
                    self.add_ip2me_route(entry.vrf_id, prefix)?;
                    self.registry.with_entry_mut(alias, |e| {
                        e.ip_addresses.insert(*prefix);
                    });
                }
                Ok(())
            }
        }
    }

    fn process_del(&mut self, alias: &str, prefix: Option<&IpPrefix>) -> TaskResult<()> {
        if alias.starts_with(LOOPBACK_PREFIX) {
            return self.process_loopback_del(alias, prefix);
        }

        // Cannot locate the interface or its entry: nothing left to undo
        if self.ports.get(alias).is_none() {
            return Ok(());
        }
        if !self.registry.contains(alias) {
            return Ok(());
        }

        // A full interface delete withdraws the VNET binding along with it
        if prefix.is_none() {
            self.vnet_intfs.remove(alias);
        }

        self.remove_intf(alias, prefix)
    }

    fn process_loopback_del(&mut self, alias: &str, prefix: Option<&IpPrefix>) -> TaskResult<()> {
        match prefix {
            None => {
                if let Some(entry) = self.registry.get(alias) {
                    if !entry.ip_addresses.is_empty() {
                        return Err(TaskError::need_retry(format!(
                            "loopback {} still has prefixes",
                            alias
                        )));
                    }
                    self.registry.remove(alias);
                }
                Ok(())
            }
            Some(prefix) => {
                if let Some(entry) = self.registry.get(alias) {
                    if entry.ip_addresses.contains(prefix) {
                        self.remove_ip2me_route(entry.vrf_id, prefix)?;
                        self.registry.with_entry_mut(alias, |e| {
                            e.ip_addresses.remove(prefix);
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Applies a Set for a hardware-backed interface.
    fn set_intf(
        &mut self,
        alias: &str,
        vrf_id: VirtualRouterOid,
        prefix: Option<&IpPrefix>,
        fields: &IntfFields,
        port: &PortInfo,
    ) -> TaskResult<()> {
        if !self.registry.contains(alias) {
            // The base entry (no prefix) creates the interface; a prefix
            // entry arriving first waits for it
            if prefix.is_some() {
                return Err(TaskError::waiting_for(format!("INTF_TABLE:{}", alias)));
            }
            let rif_type = RifType::for_port_type(port.binding.port_type()).ok_or_else(|| {
                TaskError::invalid_entry(format!("no router interface on port {}", alias))
            })?;
            let rif_id = self.add_router_intfs(vrf_id, port)?;
            self.registry
                .insert(alias.to_string(), IntfsEntry::new(rif_id, rif_type, vrf_id));
            self.pending_counters.push(PendingRifCounter {
                rif_id,
                alias: alias.to_string(),
                rif_type,
            });
            return Ok(());
        }

        let Some(prefix) = prefix else {
            // Runtime attribute changes only exist for sub-interfaces
            if port.binding.port_type() == PortType::SubPort {
                self.update_sub_intf_attrs(alias, port, fields)?;
            }
            return Ok(());
        };

        let entry = self
            .registry
            .get(alias)
            .ok_or_else(|| TaskError::waiting_for(format!("INTF_TABLE:{}", alias)))?;

        if entry.ip_addresses.contains(prefix) {
            // Duplicate entry
            return Ok(());
        }

        // The overlap check spans every interface of the virtual router:
        // the two-stage address tooling can transiently leave a broad mask
        // on another alias, and the request must be held until it clears
        if let Some((other_alias, other_prefix)) = self.registry.find_overlap(entry.vrf_id, prefix)
        {
            info!(
                "Interface {} ip {} overlaps with {} on {}; holding",
                alias, prefix, other_prefix, other_alias
            );
            return Err(TaskError::need_retry(format!(
                "prefix {} overlaps {} on {}",
                prefix, other_prefix, other_alias
            )));
        }

        self.add_ip2me_route(entry.vrf_id, prefix)?;
        if entry.rif_type == RifType::Vlan {
            self.add_directed_broadcast(entry.rif_id, prefix);
        }
        self.registry.with_entry_mut(alias, |e| {
            e.ip_addresses.insert(*prefix);
        });
        Ok(())
    }

    fn update_sub_intf_attrs(
        &mut self,
        alias: &str,
        port: &PortInfo,
        fields: &IntfFields,
    ) -> TaskResult<()> {
        let Some(rif_id) = self.registry.router_intf_id(alias) else {
            return Ok(());
        };

        let mtu = fields.mtu.unwrap_or(port.mtu);
        let admin_up = fields.admin_up.unwrap_or(port.admin_up);
        let mut changed = false;

        if mtu != port.mtu {
            if let Err(e) = self.hal.set_router_interface_mtu(rif_id, mtu) {
                error!("Failed to set interface {} mtu to {}, rv:{}", alias, mtu, e);
            } else {
                info!("Set interface {} mtu to {}", alias, mtu);
                changed = true;
            }
        }
        if admin_up != port.admin_up {
            if let Err(e) = self.hal.set_router_interface_admin_state(rif_id, admin_up) {
                error!(
                    "Failed to set interface {} admin to {}, rv:{}",
                    alias, admin_up, e
                );
            } else {
                info!("Set interface {} admin to {}", alias, admin_up);
                changed = true;
            }
        }
        if changed {
            self.ports.set_attributes(alias, admin_up, mtu);
        }
        Ok(())
    }

    /// Removes a prefix, or the whole interface when no prefix is given.
    fn remove_intf(&mut self, alias: &str, prefix: Option<&IpPrefix>) -> TaskResult<()> {
        let Some(entry) = self.registry.get(alias) else {
            return Ok(());
        };

        if let Some(prefix) = prefix {
            if entry.ip_addresses.contains(prefix) {
                self.remove_ip2me_route(entry.vrf_id, prefix)?;
                if entry.rif_type == RifType::Vlan {
                    self.remove_directed_broadcast(entry.rif_id, prefix);
                }
                self.registry.with_entry_mut(alias, |e| {
                    e.ip_addresses.remove(prefix);
                });
            }
            return Ok(());
        }

        if !entry.ip_addresses.is_empty() {
            return Err(TaskError::need_retry(format!(
                "interface {} still has {} prefixes",
                alias,
                entry.ip_addresses.len()
            )));
        }
        if self.vnet_intfs.contains_key(alias) {
            return Err(TaskError::need_retry(format!(
                "interface {} still bound to a VNET",
                alias
            )));
        }
        self.remove_router_intfs(alias, &entry)
    }

    fn add_router_intfs(
        &mut self,
        vrf_id: VirtualRouterOid,
        port: &PortInfo,
    ) -> TaskResult<RouterInterfaceOid> {
        let binding = port.rif_binding().ok_or_else(|| {
            TaskError::invalid_entry(format!("no router interface on port {}", port.alias))
        })?;
        let req = RifRequest {
            vrf_id,
            src_mac: self.config.src_mac,
            binding,
            mtu: port.mtu,
        };

        match self.hal.create_router_interface(&req) {
            Ok(rif_id) => {
                info!(
                    "Created router interface {} mtu {} id {}",
                    port.alias, port.mtu, rif_id
                );
                Ok(rif_id)
            }
            Err(e) => {
                // A failure here means the hardware and the port layer
                // disagree; retrying cannot converge
                error!("Failed to create router interface {}, rv:{}", port.alias, e);
                Err(TaskError::fatal(format!(
                    "router interface create failed for {}: {}",
                    port.alias, e
                )))
            }
        }
    }

    fn remove_router_intfs(&mut self, alias: &str, entry: &IntfsEntry) -> TaskResult<()> {
        if self.registry.ref_count(alias).unwrap_or(0) > 0 {
            info!("Router interface {} is still referenced", alias);
            return Err(TaskError::need_retry(format!(
                "interface {} still referenced",
                alias
            )));
        }

        if entry.rif_id.is_valid() {
            // An interface that never got registered only leaves the
            // pending set; a registered one must be withdrawn
            let was_pending = self.pending_counters.iter().any(|p| p.alias == alias);
            self.pending_counters.retain(|p| p.alias != alias);
            if !was_pending {
                self.registrar.unregister_rif(entry.rif_id, alias);
            }

            match self.hal.remove_router_interface(entry.rif_id) {
                Ok(()) => info!("Removed router interface {}", alias),
                Err(e) if e.is_not_found() => {
                    warn!("Router interface {} already gone, rv:{}", alias, e)
                }
                Err(e) => {
                    error!("Failed to remove router interface {}, rv:{}", alias, e);
                    return Err(TaskError::fatal(format!(
                        "router interface remove failed for {}: {}",
                        alias, e
                    )));
                }
            }
        }

        self.registry.remove(alias);
        if entry.rif_type == RifType::SubPort && !self.ports.remove_sub_port(alias) {
            warn!("Sub interface port {} was already removed", alias);
        }
        Ok(())
    }

    /// Programs the self route for an accepted prefix.
    fn add_ip2me_route(&mut self, vrf_id: VirtualRouterOid, prefix: &IpPrefix) -> TaskResult<()> {
        let host = IpPrefix::host(*prefix.address());
        match self.hal.create_route(vrf_id, &host, RouteTarget::CpuPort) {
            Ok(()) => {
                self.crm
                    .lock()
                    .unwrap()
                    .inc_res_used(CrmResource::route_for(prefix));
                info!("Created ip2me route {}", host);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                warn!("ip2me route {} already exists, rv:{}", host, e);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create ip2me route {}, rv:{}", host, e);
                Err(TaskError::fatal(format!(
                    "ip2me route create failed for {}: {}",
                    host, e
                )))
            }
        }
    }

    fn remove_ip2me_route(
        &mut self,
        vrf_id: VirtualRouterOid,
        prefix: &IpPrefix,
    ) -> TaskResult<()> {
        let host = IpPrefix::host(*prefix.address());
        match self.hal.remove_route(vrf_id, &host) {
            Ok(()) => {
                self.crm
                    .lock()
                    .unwrap()
                    .dec_res_used(CrmResource::route_for(prefix));
                info!("Removed ip2me route {}", host);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("ip2me route {} already gone, rv:{}", host, e);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove ip2me route {}, rv:{}", host, e);
                Err(TaskError::fatal(format!(
                    "ip2me route remove failed for {}: {}",
                    host, e
                )))
            }
        }
    }

    /// Binds the subnet broadcast address to the broadcast MAC on VLAN
    /// interfaces. Only IPv4 subnets of mask length 30 or shorter have a
    /// broadcast address.
    fn add_directed_broadcast(&mut self, rif_id: RouterInterfaceOid, prefix: &IpPrefix) {
        let Some(bcast) = prefix.broadcast_address() else {
            return;
        };
        let ip = IpAddress::V4(bcast);
        match self.hal.create_neighbor(rif_id, &ip, &MacAddress::BROADCAST) {
            Ok(()) => info!("Added broadcast binding for {}", ip),
            Err(e) if e.is_already_exists() => debug!("Broadcast binding {} exists", ip),
            Err(e) => error!("Failed to create broadcast binding {}, rv:{}", ip, e),
        }
    }

    fn remove_directed_broadcast(&mut self, rif_id: RouterInterfaceOid, prefix: &IpPrefix) {
        let Some(bcast) = prefix.broadcast_address() else {
            return;
        };
        let ip = IpAddress::V4(bcast);
        match self.hal.remove_neighbor(rif_id, &ip) {
            Ok(()) => info!("Removed broadcast binding for {}", ip),
            Err(e) if e.is_not_found() => error!("No broadcast binding found for {}", ip),
            Err(e) => error!("Failed to remove broadcast binding {}, rv:{}", ip, e),
        }
    }
}

#[async_trait]
impl Orch for IntfsOrch {
    fn name(&self) -> &str {
        "IntfsOrch"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn ingest(&mut self) {
        let count = self.consumer.ingest_from(self.feed.as_mut());
        if count > 0 {
            debug!("IntfsOrch: ingested {} records", count);
        }
    }

    async fn do_task(&mut self) -> TaskResult<()> {
        if !self.ports.all_ports_ready() {
            return Ok(());
        }

        for key in self.consumer.pending_keys() {
            while let Some(entry) = self.consumer.front(&key).cloned() {
                let result = self.process_entry(&entry);
                match result.to_status() {
                    status if status.is_resolved() => {
                        if status == TaskStatus::InvalidEntry {
                            if let Err(e) = &result {
                                error!("IntfsOrch: dropping {}: {}", entry.key, e);
                            }
                        }
                        self.consumer.remove_front(&key);
                    }
                    TaskStatus::Fatal => return result,
                    _ => {
                        // Left in place; retried next cycle once the
                        // dependency clears
                        if let Err(e) = &result {
                            debug!("IntfsOrch: {} pending: {}", entry.key, e);
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

    fn on_timer(&mut self) {
        if self.pending_counters.is_empty() {
            return;
        }
        debug!(
            "IntfsOrch: checking {} interfaces for counter registration",
            self.pending_counters.len()
        );
        let mut still_pending = Vec::new();
        for pending in self.pending_counters.drain(..) {
            if self.hal.object_visible(pending.rif_id.as_raw()) {
                self.registrar
                    .register_rif(pending.rif_id, &pending.alias, pending.rif_type);
            } else {
                still_pending.push(pending);
            }
        }
        self.pending_counters = still_pending;
    }
}

/// Splits an interface key into alias and optional prefix.
///
/// Keys are `alias` or `alias:prefix`; the prefix itself may contain colons
/// (IPv6), so only the first separator splits.
fn parse_intf_key(key: &str) -> TaskResult<(String, Option<IpPrefix>)> {
    match key.split_once(':') {
        None => Ok((key.to_string(), None)),
        Some((alias, prefix_str)) => {
            let prefix: IpPrefix = prefix_str
                .parse()
                .map_err(|_| TaskError::invalid_entry(format!("bad prefix in key {}", key)))?;
            Ok((alias.to_string(), Some(prefix)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flex_counter::MemoryCounterStore;
    use crate::ports::PortBinding;
    use std::collections::{HashMap, HashSet};
    use switchd_hal::{HalError, HalOp, PortOid, SoftSwitch, VlanOid};
    use switchd_orch_common::MemoryFeed;
    use switchd_types::VlanId;

    struct TestCallbacks {
        vrfs: HashMap<String, VirtualRouterOid>,
        vnets: HashSet<String>,
    }

    impl IntfsOrchCallbacks for TestCallbacks {
        fn vrf_exists(&self, name: &str) -> bool {
            self.vrfs.contains_key(name)
        }

        fn get_vrf_id(&self, name: &str) -> Option<VirtualRouterOid> {
            self.vrfs.get(name).copied()
        }

        fn vnet_exists(&self, name: &str) -> bool {
            self.vnets.contains(name)
        }
    }

    struct Harness {
        orch: IntfsOrch,
        feed: MemoryFeed,
        hal: Arc<SoftSwitch>,
        crm: SharedCrm,
        store: Arc<MemoryCounterStore>,
        ports: PortsView,
        vrf: VirtualRouterOid,
    }

    fn harness() -> Harness {
        let hal = Arc::new(SoftSwitch::new());
        let crm = crate::crm::new_shared();
        let store = Arc::new(MemoryCounterStore::new());
        let registrar = Arc::new(RifCounterRegistrar::new(store.clone()));
        let ports = PortsView::new();
        ports.set_all_ports_ready(true);
        ports.insert(PortInfo {
            alias: "Ethernet4".into(),
            binding: PortBinding::Phy(PortOid::from_raw(0x104).unwrap()),
            mtu: 9100,
            admin_up: true,
            oper_up: true,
        });
        ports.insert(PortInfo {
            alias: "Ethernet8".into(),
            binding: PortBinding::Phy(PortOid::from_raw(0x108).unwrap()),
            mtu: 9100,
            admin_up: true,
            oper_up: true,
        });
        ports.insert(PortInfo {
            alias: "Vlan100".into(),
            binding: PortBinding::Vlan {
                oid: VlanOid::from_raw(0x200).unwrap(),
                vlan_id: VlanId::new(100).unwrap(),
            },
            mtu: 9100,
            admin_up: true,
            oper_up: true,
        });

        let vrf = VirtualRouterOid::from_raw(0x3000000000000001).unwrap();
        let callbacks = Arc::new(TestCallbacks {
            vrfs: HashMap::new(),
            vnets: HashSet::new(),
        });
        let feed = MemoryFeed::new("INTF_TABLE");
        let orch = IntfsOrch::new(
            IntfsOrchConfig::new(vrf, "02:42:00:00:00:01".parse().unwrap()),
            Box::new(feed.clone()),
            ports.clone(),
            hal.clone(),
            crm.clone(),
            registrar,
            callbacks,
        );

        Harness {
            orch,
            feed,
            hal,
            crm,
            store,
            ports,
            vrf,
        }
    }

    async fn run(h: &mut Harness) {
        h.orch.ingest();
        h.orch.do_task().await.unwrap();
    }

    #[tokio::test]
    async fn test_rif_created_on_base_entry() {
        let mut h = harness();
        h.feed.publish_set("Ethernet4", vec![]);
        run(&mut h).await;

        assert_eq!(h.hal.rif_count(), 1);
        assert!(h.orch.registry().router_intf_id("Ethernet4").is_some());
        assert!(!h.orch.has_pending_tasks());

        // Counter registration is deferred to the timer
        assert_eq!(h.store.registered_count(), 0);
        h.orch.on_timer();
        assert_eq!(h.store.registered_count(), 1);
        assert_eq!(h.orch.pending_counter_count(), 0);
    }

    #[tokio::test]
    async fn test_deferred_registration_waits_for_visibility() {
        let mut h = harness();
        h.hal.set_deferred_visibility(true);
        h.feed.publish_set("Ethernet4", vec![]);
        run(&mut h).await;

        h.orch.on_timer();
        assert_eq!(h.store.registered_count(), 0);
        assert_eq!(h.orch.pending_counter_count(), 1);

        h.hal.publish_visibility();
        h.orch.on_timer();
        assert_eq!(h.store.registered_count(), 1);
    }

    #[tokio::test]
    async fn test_disjoint_prefixes_accepted_overlap_held() {
        let mut h = harness();
        h.feed.publish_set("Ethernet4", vec![]);
        h.feed.publish_set("Ethernet4:10.0.0.1/24", vec![]);
        h.feed.publish_set("Ethernet4:10.0.1.1/24", vec![]);
        h.feed.publish_set("Ethernet8", vec![]);
        run(&mut h).await;

        // One RIF per alias, two self routes for Ethernet4
        assert_eq!(h.hal.rif_count(), 2);
        assert!(h
            .hal
            .has_route(h.vrf, &"10.0.0.1/32".parse().unwrap()));
        assert!(h
            .hal
            .has_route(h.vrf, &"10.0.1.1/32".parse().unwrap()));
        assert_eq!(h.crm.lock().unwrap().used(CrmResource::Ipv4Route), 2);

        // Overlapping prefix on another alias is held, not failed
        h.feed.publish_set("Ethernet8:10.0.0.2/24", vec![]);
        run(&mut h).await;
        assert!(h.orch.has_pending_tasks());
        assert!(!h.hal.has_route(h.vrf, &"10.0.0.2/32".parse().unwrap()));

        // The hold clears when the conflicting prefix goes away; the held
        // task completes on its next retry
        h.feed.publish_del("Ethernet4:10.0.0.1/24");
        run(&mut h).await;
        run(&mut h).await;
        assert!(!h.orch.has_pending_tasks());
        assert!(h.hal.has_route(h.vrf, &"10.0.0.2/32".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_fatal_rif_create_leaves_no_state() {
        let mut h = harness();
        h.hal.inject_failure(
            HalOp::CreateRouterInterface,
            HalError::TableFull("rif".into()),
        );
        h.feed.publish_set("Ethernet4", vec![]);

        h.orch.ingest();
        let err = h.orch.do_task().await.unwrap_err();
        assert!(err.is_fatal());

        // Nothing tracked, nothing to roll back
        assert!(h.orch.registry().is_empty());
        assert_eq!(h.hal.rif_count(), 0);
        assert_eq!(h.hal.route_count(), 0);
        assert_eq!(h.orch.pending_counter_count(), 0);
    }

    #[tokio::test]
    async fn test_removal_refused_while_referenced() {
        let mut h = harness();
        h.feed.publish_set("Ethernet4", vec![]);
        run(&mut h).await;

        let registry = h.orch.registry();
        registry.increase_ref_count("Ethernet4").unwrap();

        h.feed.publish_del("Ethernet4");
        run(&mut h).await;
        assert!(h.orch.has_pending_tasks());
        assert_eq!(h.hal.rif_count(), 1);

        registry.decrease_ref_count("Ethernet4").unwrap();
        run(&mut h).await;
        assert!(!h.orch.has_pending_tasks());
        assert_eq!(h.hal.rif_count(), 0);
        assert!(!registry.contains("Ethernet4"));
    }

    #[tokio::test]
    async fn test_prefix_before_base_entry_waits() {
        let mut h = harness();
        h.feed.publish_set("Ethernet4:10.0.0.1/24", vec![]);
        run(&mut h).await;
        assert!(h.orch.has_pending_tasks());
        assert_eq!(h.hal.rif_count(), 0);

        // The base entry lands in the same pass; the held prefix resolves
        // on its next retry
        h.feed.publish_set("Ethernet4", vec![]);
        run(&mut h).await;
        run(&mut h).await;
        assert!(!h.orch.has_pending_tasks());
        assert_eq!(h.hal.rif_count(), 1);
        assert!(h.hal.has_route(h.vrf, &"10.0.0.1/32".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_loopback_tracked_without_hardware() {
        let mut h = harness();
        h.feed.publish_set("Loopback0", vec![]);
        h.feed.publish_set("Loopback0:10.1.0.1/32", vec![]);
        run(&mut h).await;

        assert_eq!(h.hal.rif_count(), 0);
        assert!(h.orch.registry().contains("Loopback0"));
        assert!(h.orch.registry().router_intf_id("Loopback0").is_none());
        assert!(h.hal.has_route(h.vrf, &"10.1.0.1/32".parse().unwrap()));

        h.feed.publish_del("Loopback0:10.1.0.1/32");
        h.feed.publish_del("Loopback0");
        run(&mut h).await;
        assert!(!h.orch.registry().contains("Loopback0"));
        assert!(!h.hal.has_route(h.vrf, &"10.1.0.1/32".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_vlan_prefix_adds_directed_broadcast() {
        let mut h = harness();
        h.feed.publish_set("Vlan100", vec![]);
        h.feed.publish_set("Vlan100:192.168.0.1/24", vec![]);
        run(&mut h).await;

        let rif = h.orch.registry().router_intf_id("Vlan100").unwrap();
        let bcast: IpAddress = "192.168.0.255".parse().unwrap();
        assert_eq!(
            h.hal.neighbor_mac(rif, &bcast),
            Some(MacAddress::BROADCAST)
        );

        // /31 has no broadcast address
        h.feed.publish_set("Vlan100:192.168.1.0/31", vec![]);
        run(&mut h).await;
        assert_eq!(h.hal.neighbor_count(), 1);

        h.feed.publish_del("Vlan100:192.168.0.1/24");
        run(&mut h).await;
        assert_eq!(h.hal.neighbor_mac(rif, &bcast), None);
    }

    #[tokio::test]
    async fn test_sub_interface_create_and_attr_change() {
        let mut h = harness();
        h.feed.publish_set(
            "Ethernet4.100",
            vec![
                ("admin_status".into(), "up".into()),
                ("mtu".into(), "9100".into()),
            ],
        );
        run(&mut h).await;

        assert_eq!(h.hal.rif_count(), 1);
        assert!(h.ports.get("Ethernet4.100").is_some());

        // Runtime MTU change on the provisioned sub-interface
        h.feed.publish_set(
            "Ethernet4.100",
            vec![
                ("admin_status".into(), "up".into()),
                ("mtu".into(), "1500".into()),
            ],
        );
        run(&mut h).await;
        assert_eq!(h.ports.get("Ethernet4.100").unwrap().mtu, 1500);

        // Removal also drops the carved-out port
        h.feed.publish_del("Ethernet4.100");
        run(&mut h).await;
        assert_eq!(h.hal.rif_count(), 0);
        assert!(h.ports.get("Ethernet4.100").is_none());
    }

    #[tokio::test]
    async fn test_vrf_dependency_holds_task() {
        let mut h = harness();
        h.feed
            .publish_set("Ethernet4", vec![("vrf_name".into(), "Vrf-red".into())]);
        run(&mut h).await;
        assert!(h.orch.has_pending_tasks());
        assert_eq!(h.hal.rif_count(), 0);
    }

    #[test]
    fn test_parse_intf_key() {
        let (alias, prefix) = parse_intf_key("Ethernet4").unwrap();
        assert_eq!(alias, "Ethernet4");
        assert!(prefix.is_none());

        let (alias, prefix) = parse_intf_key("Ethernet4:10.0.0.1/24").unwrap();
        assert_eq!(alias, "Ethernet4");
        assert_eq!(prefix.unwrap().to_string(), "10.0.0.1/24");

        // IPv6 prefixes carry colons of their own
        let (alias, prefix) = parse_intf_key("Ethernet4:2001:db8::1/64").unwrap();
        assert_eq!(alias, "Ethernet4");
        assert_eq!(prefix.unwrap().to_string(), "2001:db8::1/64");

        assert!(parse_intf_key("Ethernet4:not-a-prefix").is_err());
    }
}
