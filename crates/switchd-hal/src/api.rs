//! The [`SwitchHal`] trait and its request types.
//!
//! Calls are synchronous and expected to return promptly; retry and timeout
//! policy lives with the caller, not in the trait.

use crate::error::HalResult;
use crate::types::{
    LagOid, NextHopOid, PortOid, RawObjectId, RouterInterfaceOid, VirtualRouterOid, VlanOid,
};
use switchd_types::{IpAddress, IpPrefix, MacAddress};

/// The port/LAG/VLAN/sub-port binding of a router interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RifBinding {
    Port(PortOid),
    Lag(LagOid),
    Vlan(VlanOid),
    SubPort {
        parent: PortOid,
        outer_vlan: u16,
        admin_up: bool,
    },
}

/// Attributes for creating a router interface.
#[derive(Debug, Clone)]
pub struct RifRequest {
    /// Owning virtual router.
    pub vrf_id: VirtualRouterOid,
    /// Source MAC programmed on the interface.
    pub src_mac: MacAddress,
    /// Port binding of the interface.
    pub binding: RifBinding,
    /// MTU in bytes.
    pub mtu: u32,
}

/// Forwarding target of a route entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Punt to the CPU port (ip2me/self routes).
    CpuPort,
    /// Forward via a next-hop object.
    NextHop(NextHopOid),
    /// Silently drop.
    Drop,
}

/// Hardware programming interface.
///
/// Implementations take `&self`; interior mutability is their concern, since
/// the single control thread may hold the handle from several components.
pub trait SwitchHal: Send + Sync {
    // Router interfaces

    /// Creates a router interface and returns its id.
    fn create_router_interface(&self, req: &RifRequest) -> HalResult<RouterInterfaceOid>;

    /// Updates the MTU of an existing router interface.
    fn set_router_interface_mtu(&self, rif_id: RouterInterfaceOid, mtu: u32) -> HalResult<()>;

    /// Updates the v4/v6 admin state of an existing router interface.
    fn set_router_interface_admin_state(
        &self,
        rif_id: RouterInterfaceOid,
        admin_up: bool,
    ) -> HalResult<()>;

    /// Removes a router interface.
    fn remove_router_interface(&self, rif_id: RouterInterfaceOid) -> HalResult<()>;

    // Neighbors

    /// Creates a neighbor binding (IP-to-MAC) on a router interface.
    fn create_neighbor(
        &self,
        rif_id: RouterInterfaceOid,
        ip: &IpAddress,
        mac: &MacAddress,
    ) -> HalResult<()>;

    /// Rewrites the MAC of an existing neighbor binding in place.
    fn set_neighbor_mac(
        &self,
        rif_id: RouterInterfaceOid,
        ip: &IpAddress,
        mac: &MacAddress,
    ) -> HalResult<()>;

    /// Removes a neighbor binding.
    fn remove_neighbor(&self, rif_id: RouterInterfaceOid, ip: &IpAddress) -> HalResult<()>;

    // Next-hops

    /// Creates a next-hop object for an IP reachable over a router interface.
    fn create_next_hop(&self, rif_id: RouterInterfaceOid, ip: &IpAddress)
        -> HalResult<NextHopOid>;

    /// Removes a next-hop object.
    fn remove_next_hop(&self, nh_id: NextHopOid) -> HalResult<()>;

    // Routes

    /// Creates a route entry.
    fn create_route(
        &self,
        vrf_id: VirtualRouterOid,
        dest: &IpPrefix,
        target: RouteTarget,
    ) -> HalResult<()>;

    /// Removes a route entry.
    fn remove_route(&self, vrf_id: VirtualRouterOid, dest: &IpPrefix) -> HalResult<()>;

    // Id-mapping layer

    /// Returns true once the object is visible in the hardware id-mapping
    /// layer used by the stats subsystem. Freshly created objects may lag.
    fn object_visible(&self, id: RawObjectId) -> bool;
}
