//! Router-interface entry types.

use std::collections::HashSet;
use std::fmt;
use switchd_hal::{RouterInterfaceOid, VirtualRouterOid};
use switchd_orch_common::HasRefCount;
use switchd_types::{IpPrefix, PortType};

/// Router interface type, mirroring the hardware binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RifType {
    Port,
    Lag,
    Vlan,
    SubPort,
    Loopback,
}

impl RifType {
    /// Maps a port classification to the interface type created on it.
    pub fn for_port_type(port_type: PortType) -> Option<Self> {
        match port_type {
            PortType::Phy => Some(RifType::Port),
            PortType::Lag => Some(RifType::Lag),
            PortType::Vlan => Some(RifType::Vlan),
            PortType::SubPort => Some(RifType::SubPort),
            PortType::Loopback => Some(RifType::Loopback),
            PortType::Cpu => None,
        }
    }

    /// The type string the stats subsystem keys object types by.
    pub fn hal_type_name(&self) -> &'static str {
        match self {
            RifType::Port | RifType::Lag => "RIF_TYPE_PORT",
            RifType::Vlan => "RIF_TYPE_VLAN",
            RifType::SubPort => "RIF_TYPE_SUB_PORT",
            RifType::Loopback => "RIF_TYPE_LOOPBACK",
        }
    }
}

impl fmt::Display for RifType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RifType::Port => "port",
            RifType::Lag => "lag",
            RifType::Vlan => "vlan",
            RifType::SubPort => "subport",
            RifType::Loopback => "loopback",
        };
        write!(f, "{}", s)
    }
}

/// Tracked state of one router interface.
#[derive(Debug, Clone)]
pub struct IntfsEntry {
    /// Hardware id; null for loopback interfaces, which have no hardware
    /// object.
    pub rif_id: RouterInterfaceOid,
    pub rif_type: RifType,
    pub vrf_id: VirtualRouterOid,
    /// Assigned prefixes, unique per interface.
    pub ip_addresses: HashSet<IpPrefix>,
    ref_count: u32,
}

impl IntfsEntry {
    pub fn new(rif_id: RouterInterfaceOid, rif_type: RifType, vrf_id: VirtualRouterOid) -> Self {
        Self {
            rif_id,
            rif_type,
            vrf_id,
            ip_addresses: HashSet::new(),
            ref_count: 0,
        }
    }
}

impl HasRefCount for IntfsEntry {
    fn increment_ref(&mut self) -> u32 {
        self.ref_count += 1;
        self.ref_count
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        if self.ref_count == 0 {
            None
        } else {
            self.ref_count -= 1;
            Some(self.ref_count)
        }
    }

    fn ref_count(&self) -> u32 {
        self.ref_count
    }
}

/// A created interface awaiting counter registration.
///
/// Registration is deferred until the hardware id-mapping layer reports the
/// object visible; see [`crate::intfs::IntfsOrch::on_timer`].
#[derive(Debug, Clone)]
pub struct PendingRifCounter {
    pub rif_id: RouterInterfaceOid,
    pub alias: String,
    pub rif_type: RifType,
}
