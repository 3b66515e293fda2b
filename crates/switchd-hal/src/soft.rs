//! In-memory reference implementation of [`SwitchHal`].
//!
//! `SoftSwitch` behaves like a well-behaved ASIC: it allocates object ids,
//! enforces existence and in-use rules, and reports the same benign/fatal
//! status taxonomy the real hardware layer does. The demo binary runs on it,
//! and the orchestration test suites use its failure-injection and
//! deferred-visibility switches to exercise error paths.

use crate::api::{RifRequest, RouteTarget, SwitchHal};
use crate::error::{HalError, HalResult};
use crate::types::{NextHopOid, RawObjectId, RouterInterfaceOid, VirtualRouterOid};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use switchd_types::{IpAddress, IpPrefix, MacAddress};

/// Hardware operations that can have failures injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalOp {
    CreateRouterInterface,
    RemoveRouterInterface,
    CreateNeighbor,
    SetNeighborMac,
    RemoveNeighbor,
    CreateNextHop,
    RemoveNextHop,
    CreateRoute,
    RemoveRoute,
}

const KIND_RIF: u64 = 0x06;
const KIND_NEXT_HOP: u64 = 0x07;

#[derive(Default)]
struct SoftInner {
    next_seq: u64,
    rifs: HashMap<RawObjectId, RifRequest>,
    neighbors: HashMap<(RawObjectId, IpAddress), MacAddress>,
    next_hops: HashMap<RawObjectId, (RawObjectId, IpAddress)>,
    nh_by_key: HashMap<(RawObjectId, IpAddress), RawObjectId>,
    routes: HashMap<(RawObjectId, IpPrefix), RouteTarget>,
    visible: HashSet<RawObjectId>,
    defer_visibility: bool,
    injected: HashMap<HalOp, VecDeque<HalError>>,
}

impl SoftInner {
    fn alloc(&mut self, kind: u64) -> RawObjectId {
        self.next_seq += 1;
        (kind << 56) | self.next_seq
    }

    fn take_injected(&mut self, op: HalOp) -> Option<HalError> {
        self.injected.get_mut(&op).and_then(|q| q.pop_front())
    }
}

/// An in-memory switch.
#[derive(Default)]
pub struct SoftSwitch {
    inner: Mutex<SoftInner>,
}

impl SoftSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error to be returned by the next call of the given
    /// operation.
    pub fn inject_failure(&self, op: HalOp, err: HalError) {
        let mut inner = self.inner.lock().unwrap();
        inner.injected.entry(op).or_default().push_back(err);
    }

    /// When enabled, newly created objects do not appear in the id-mapping
    /// layer until [`SoftSwitch::publish_visibility`] runs.
    pub fn set_deferred_visibility(&self, defer: bool) {
        self.inner.lock().unwrap().defer_visibility = defer;
    }

    /// Makes every currently existing object visible to the id-mapping layer.
    pub fn publish_visibility(&self) {
        let mut inner = self.inner.lock().unwrap();
        let ids: Vec<RawObjectId> = inner
            .rifs
            .keys()
            .chain(inner.next_hops.keys())
            .copied()
            .collect();
        inner.visible.extend(ids);
    }

    // Inspection accessors used by tests and diagnostics.

    pub fn rif_count(&self) -> usize {
        self.inner.lock().unwrap().rifs.len()
    }

    pub fn neighbor_count(&self) -> usize {
        self.inner.lock().unwrap().neighbors.len()
    }

    pub fn next_hop_count(&self) -> usize {
        self.inner.lock().unwrap().next_hops.len()
    }

    pub fn route_count(&self) -> usize {
        self.inner.lock().unwrap().routes.len()
    }

    pub fn has_route(&self, vrf_id: VirtualRouterOid, dest: &IpPrefix) -> bool {
        self.inner
            .lock()
            .unwrap()
            .routes
            .contains_key(&(vrf_id.as_raw(), *dest))
    }

    pub fn neighbor_mac(&self, rif_id: RouterInterfaceOid, ip: &IpAddress) -> Option<MacAddress> {
        self.inner
            .lock()
            .unwrap()
            .neighbors
            .get(&(rif_id.as_raw(), *ip))
            .copied()
    }

    /// Removes a neighbor binding behind the control plane's back, as an
    /// external agent (e.g. a hardware flush) would.
    pub fn evict_neighbor(&self, rif_id: RouterInterfaceOid, ip: &IpAddress) {
        let mut inner = self.inner.lock().unwrap();
        inner.neighbors.remove(&(rif_id.as_raw(), *ip));
    }

    /// Removes a next-hop object behind the control plane's back.
    pub fn evict_next_hop(&self, nh_id: NextHopOid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(key) = inner.next_hops.remove(&nh_id.as_raw()) {
            inner.nh_by_key.remove(&key);
        }
    }
}

impl SwitchHal for SoftSwitch {
    fn create_router_interface(&self, req: &RifRequest) -> HalResult<RouterInterfaceOid> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::CreateRouterInterface) {
            return Err(err);
        }

        let raw = inner.alloc(KIND_RIF);
        inner.rifs.insert(raw, req.clone());
        if !inner.defer_visibility {
            inner.visible.insert(raw);
        }
        debug!("soft: created rif 0x{:x} mtu {}", raw, req.mtu);
        Ok(RouterInterfaceOid::from_raw_unchecked(raw))
    }

    fn set_router_interface_mtu(&self, rif_id: RouterInterfaceOid, mtu: u32) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.rifs.get_mut(&rif_id.as_raw()) {
            Some(rif) => {
                rif.mtu = mtu;
                Ok(())
            }
            None => Err(HalError::NotFound(format!("rif {}", rif_id))),
        }
    }

    fn set_router_interface_admin_state(
        &self,
        rif_id: RouterInterfaceOid,
        _admin_up: bool,
    ) -> HalResult<()> {
        let inner = self.inner.lock().unwrap();
        if inner.rifs.contains_key(&rif_id.as_raw()) {
            Ok(())
        } else {
            Err(HalError::NotFound(format!("rif {}", rif_id)))
        }
    }

    fn remove_router_interface(&self, rif_id: RouterInterfaceOid) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::RemoveRouterInterface) {
            return Err(err);
        }

        let raw = rif_id.as_raw();
        if !inner.rifs.contains_key(&raw) {
            return Err(HalError::NotFound(format!("rif {}", rif_id)));
        }
        let referenced = inner.neighbors.keys().any(|(r, _)| *r == raw)
            || inner.next_hops.values().any(|(r, _)| *r == raw);
        if referenced {
            return Err(HalError::ObjectInUse(format!("rif {}", rif_id)));
        }
        inner.rifs.remove(&raw);
        inner.visible.remove(&raw);
        Ok(())
    }

    fn create_neighbor(
        &self,
        rif_id: RouterInterfaceOid,
        ip: &IpAddress,
        mac: &MacAddress,
    ) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::CreateNeighbor) {
            return Err(err);
        }

        let raw = rif_id.as_raw();
        if !inner.rifs.contains_key(&raw) {
            return Err(HalError::InvalidParameter(format!("rif {}", rif_id)));
        }
        let key = (raw, *ip);
        if inner.neighbors.contains_key(&key) {
            return Err(HalError::AlreadyExists(format!("neighbor {}", ip)));
        }
        inner.neighbors.insert(key, *mac);
        Ok(())
    }

    fn set_neighbor_mac(
        &self,
        rif_id: RouterInterfaceOid,
        ip: &IpAddress,
        mac: &MacAddress,
    ) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::SetNeighborMac) {
            return Err(err);
        }

        match inner.neighbors.get_mut(&(rif_id.as_raw(), *ip)) {
            Some(entry) => {
                *entry = *mac;
                Ok(())
            }
            None => Err(HalError::NotFound(format!("neighbor {}", ip))),
        }
    }

    fn remove_neighbor(&self, rif_id: RouterInterfaceOid, ip: &IpAddress) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::RemoveNeighbor) {
            return Err(err);
        }

        if inner.neighbors.remove(&(rif_id.as_raw(), *ip)).is_none() {
            return Err(HalError::NotFound(format!("neighbor {}", ip)));
        }
        Ok(())
    }

    fn create_next_hop(
        &self,
        rif_id: RouterInterfaceOid,
        ip: &IpAddress,
    ) -> HalResult<NextHopOid> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::CreateNextHop) {
            return Err(err);
        }

        let raw_rif = rif_id.as_raw();
        if !inner.rifs.contains_key(&raw_rif) {
            return Err(HalError::InvalidParameter(format!("rif {}", rif_id)));
        }
        let key = (raw_rif, *ip);
        if inner.nh_by_key.contains_key(&key) {
            return Err(HalError::AlreadyExists(format!("next hop {}", ip)));
        }
        let raw = inner.alloc(KIND_NEXT_HOP);
        inner.next_hops.insert(raw, key);
        inner.nh_by_key.insert(key, raw);
        if !inner.defer_visibility {
            inner.visible.insert(raw);
        }
        Ok(NextHopOid::from_raw_unchecked(raw))
    }

    fn remove_next_hop(&self, nh_id: NextHopOid) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::RemoveNextHop) {
            return Err(err);
        }

        match inner.next_hops.remove(&nh_id.as_raw()) {
            Some(key) => {
                inner.nh_by_key.remove(&key);
                inner.visible.remove(&nh_id.as_raw());
                Ok(())
            }
            None => Err(HalError::NotFound(format!("next hop {}", nh_id))),
        }
    }

    fn create_route(
        &self,
        vrf_id: VirtualRouterOid,
        dest: &IpPrefix,
        target: RouteTarget,
    ) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::CreateRoute) {
            return Err(err);
        }

        let key = (vrf_id.as_raw(), *dest);
        if inner.routes.contains_key(&key) {
            return Err(HalError::AlreadyExists(format!("route {}", dest)));
        }
        inner.routes.insert(key, target);
        Ok(())
    }

    fn remove_route(&self, vrf_id: VirtualRouterOid, dest: &IpPrefix) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.take_injected(HalOp::RemoveRoute) {
            return Err(err);
        }

        if inner.routes.remove(&(vrf_id.as_raw(), *dest)).is_none() {
            return Err(HalError::NotFound(format!("route {}", dest)));
        }
        Ok(())
    }

    fn object_visible(&self, id: RawObjectId) -> bool {
        self.inner.lock().unwrap().visible.contains(&id)
    }
}
