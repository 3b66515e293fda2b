//! Read surface of the external port manager.
//!
//! Port provisioning is not this daemon's business; the orchestrators only
//! need to look ports up, watch their state, and carve sub-interfaces out of
//! existing parents. [`PortsView`] is that shared surface, populated by the
//! port layer (or by tests and the demo binary).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchd_hal::{LagOid, PortOid, RifBinding, VlanOid};
use switchd_types::{PortType, VlanId};

/// Separator between a parent port alias and the sub-interface VLAN id.
pub const SUB_INTF_SEPARATOR: char = '.';

/// Hardware binding of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortBinding {
    Cpu(PortOid),
    Phy(PortOid),
    Lag(LagOid),
    Vlan { oid: VlanOid, vlan_id: VlanId },
    SubPort { parent: PortOid, outer_vlan: VlanId },
}

impl PortBinding {
    /// Returns the port classification for this binding.
    pub fn port_type(&self) -> PortType {
        match self {
            PortBinding::Cpu(_) => PortType::Cpu,
            PortBinding::Phy(_) => PortType::Phy,
            PortBinding::Lag(_) => PortType::Lag,
            PortBinding::Vlan { .. } => PortType::Vlan,
            PortBinding::SubPort { .. } => PortType::SubPort,
        }
    }
}

/// A port as the orchestrators see it.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub alias: String,
    pub binding: PortBinding,
    pub mtu: u32,
    pub admin_up: bool,
    pub oper_up: bool,
}

impl PortInfo {
    /// Returns the router-interface binding for this port, if one can be
    /// programmed on it.
    pub fn rif_binding(&self) -> Option<RifBinding> {
        match self.binding {
            PortBinding::Phy(oid) => Some(RifBinding::Port(oid)),
            PortBinding::Lag(oid) => Some(RifBinding::Lag(oid)),
            PortBinding::Vlan { oid, .. } => Some(RifBinding::Vlan(oid)),
            PortBinding::SubPort { parent, outer_vlan } => Some(RifBinding::SubPort {
                parent,
                outer_vlan: outer_vlan.as_u16(),
                admin_up: self.admin_up,
            }),
            PortBinding::Cpu(_) => None,
        }
    }

    /// Returns the VLAN id of a VLAN port.
    pub fn vlan_id(&self) -> Option<VlanId> {
        match self.binding {
            PortBinding::Vlan { vlan_id, .. } => Some(vlan_id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ViewInner {
    ports: HashMap<String, PortInfo>,
    all_ready: bool,
}

/// Shared, read-mostly registry of ports.
///
/// The external port layer owns the content; orchestrators hold clones for
/// lookup. Sub-interface creation and removal are the only mutations driven
/// from the reconciliation side.
#[derive(Clone, Default)]
pub struct PortsView {
    inner: Arc<Mutex<ViewInner>>,
}

impl PortsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of a port.
    pub fn get(&self, alias: &str) -> Option<PortInfo> {
        self.inner.lock().unwrap().ports.get(alias).cloned()
    }

    /// Inserts or replaces a port.
    pub fn insert(&self, port: PortInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.ports.insert(port.alias.clone(), port);
    }

    /// Removes a port. Returns true if it existed.
    pub fn remove(&self, alias: &str) -> bool {
        self.inner.lock().unwrap().ports.remove(alias).is_some()
    }

    /// Updates a port's operational state. Returns true if the port exists.
    pub fn set_oper_state(&self, alias: &str, oper_up: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.ports.get_mut(alias) {
            Some(port) => {
                port.oper_up = oper_up;
                true
            }
            None => false,
        }
    }

    /// Updates a port's admin state and MTU (sub-interface runtime changes).
    pub fn set_attributes(&self, alias: &str, admin_up: bool, mtu: u32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.ports.get_mut(alias) {
            Some(port) => {
                port.admin_up = admin_up;
                port.mtu = mtu;
                true
            }
            None => false,
        }
    }

    /// True once the port layer finished initial provisioning. Orchestrators
    /// hold off all table processing until then.
    pub fn all_ports_ready(&self) -> bool {
        self.inner.lock().unwrap().all_ready
    }

    pub fn set_all_ports_ready(&self, ready: bool) {
        self.inner.lock().unwrap().all_ready = ready;
    }

    /// Creates a sub-interface port under an existing parent.
    ///
    /// The alias carries the outer VLAN after the separator, e.g.
    /// `Ethernet4.100`. Returns the new port, or `None` while the parent is
    /// unknown or the alias is malformed.
    pub fn add_sub_port(&self, alias: &str, admin_up: bool, mtu: u32) -> Option<PortInfo> {
        let (parent_alias, vlan_str) = alias.split_once(SUB_INTF_SEPARATOR)?;
        let outer_vlan: VlanId = vlan_str.parse().ok()?;

        let mut inner = self.inner.lock().unwrap();
        let parent = inner.ports.get(parent_alias)?;
        let parent_oid = match parent.binding {
            PortBinding::Phy(oid) => oid,
            // LAG sub-interfaces reuse the LAG id as the parent object
            PortBinding::Lag(oid) => PortOid::from_raw_unchecked(oid.as_raw()),
            _ => return None,
        };
        let oper_up = parent.oper_up;

        let port = PortInfo {
            alias: alias.to_string(),
            binding: PortBinding::SubPort {
                parent: parent_oid,
                outer_vlan,
            },
            mtu,
            admin_up,
            oper_up,
        };
        inner.ports.insert(alias.to_string(), port.clone());
        Some(port)
    }

    /// Removes a sub-interface port. Returns true if it existed.
    pub fn remove_sub_port(&self, alias: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.ports.get(alias) {
            Some(port) if port.binding.port_type() == PortType::SubPort => {
                inner.ports.remove(alias);
                true
            }
            _ => false,
        }
    }

    /// Number of known ports.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().ports.is_empty()
    }
}
