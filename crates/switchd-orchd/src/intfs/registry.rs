//! Shared read/refcount accessor over the router-interface graph.
//!
//! [`super::IntfsOrch`] exclusively owns the entries; collaborators (the
//! neighbor orchestrator, the routing layer) hold clones of this registry
//! and are restricted to lookups and the documented reference-count calls.
//! The mutating entry management stays crate-private.

use super::types::IntfsEntry;
use std::sync::{Arc, Mutex};
use switchd_hal::{RouterInterfaceOid, VirtualRouterOid};
use switchd_orch_common::{SyncMap, SyncMapError};
use switchd_types::{IpAddress, IpPrefix};

/// Shared alias → interface-entry map.
#[derive(Clone, Default)]
pub struct RifRegistry {
    inner: Arc<Mutex<SyncMap<String, IntfsEntry>>>,
}

impl RifRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hardware id of the interface on an alias, if one exists.
    ///
    /// Loopback interfaces are tracked without a hardware object and return
    /// `None`.
    pub fn router_intf_id(&self, alias: &str) -> Option<RouterInterfaceOid> {
        self.inner
            .lock()
            .unwrap()
            .get(&alias.to_string())
            .map(|entry| entry.rif_id)
            .filter(|rif_id| rif_id.is_valid())
    }

    /// Returns true if an interface is tracked for the alias.
    pub fn contains(&self, alias: &str) -> bool {
        self.inner.lock().unwrap().contains_key(&alias.to_string())
    }

    /// Increments the interface's reference count on behalf of a dependent
    /// object (neighbor, next-hop, route).
    pub fn increase_ref_count(&self, alias: &str) -> Result<u32, SyncMapError> {
        self.inner.lock().unwrap().increment_ref(&alias.to_string())
    }

    /// Releases one reference.
    pub fn decrease_ref_count(&self, alias: &str) -> Result<u32, SyncMapError> {
        self.inner.lock().unwrap().decrement_ref(&alias.to_string())
    }

    /// Returns the current reference count for an alias.
    pub fn ref_count(&self, alias: &str) -> Option<u32> {
        self.inner.lock().unwrap().ref_count(&alias.to_string())
    }

    /// Finds the alias whose subnet contains the address, within a virtual
    /// router.
    pub fn alias_for(&self, ip: &IpAddress, vrf_id: VirtualRouterOid) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        for (alias, entry) in inner.iter() {
            if entry.vrf_id != vrf_id {
                continue;
            }
            if entry.ip_addresses.iter().any(|prefix| prefix.contains(ip)) {
                return Some(alias.clone());
            }
        }
        None
    }

    /// Returns true if the prefix's subnet is assigned to the alias.
    pub fn is_prefix_subnet(&self, prefix: &IpPrefix, alias: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(&alias.to_string())
            .map(|entry| {
                entry
                    .ip_addresses
                    .iter()
                    .any(|assigned| assigned.subnet() == prefix.subnet())
            })
            .unwrap_or(false)
    }

    /// Returns the prefixes assigned to an alias.
    pub fn prefixes(&self, alias: &str) -> Vec<IpPrefix> {
        self.inner
            .lock()
            .unwrap()
            .get(&alias.to_string())
            .map(|entry| entry.ip_addresses.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Scans every tracked prefix in the virtual router for an overlap with
    /// the candidate. Returns the first conflicting (alias, prefix) pair.
    ///
    /// The scan deliberately covers all aliases, not just the target: the
    /// external configuration tooling applies addresses in two stages and
    /// can transiently install an overly broad mask on another interface.
    pub fn find_overlap(
        &self,
        vrf_id: VirtualRouterOid,
        candidate: &IpPrefix,
    ) -> Option<(String, IpPrefix)> {
        let inner = self.inner.lock().unwrap();
        for (alias, entry) in inner.iter() {
            if entry.vrf_id != vrf_id {
                continue;
            }
            for assigned in &entry.ip_addresses {
                if assigned.overlaps(candidate) {
                    return Some((alias.clone(), *assigned));
                }
            }
        }
        None
    }

    /// Lists tracked aliases.
    pub fn aliases(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    // Entry management below is reserved for the owning orchestrator.

    pub(crate) fn insert(&self, alias: String, entry: IntfsEntry) {
        self.inner.lock().unwrap().insert(alias, entry);
    }

    pub(crate) fn remove(&self, alias: &str) -> Option<IntfsEntry> {
        self.inner.lock().unwrap().remove(&alias.to_string())
    }

    pub(crate) fn get(&self, alias: &str) -> Option<IntfsEntry> {
        self.inner.lock().unwrap().get(&alias.to_string()).cloned()
    }

    pub(crate) fn with_entry_mut<R>(
        &self,
        alias: &str,
        f: impl FnOnce(&mut IntfsEntry) -> R,
    ) -> Option<R> {
        self.inner
            .lock()
            .unwrap()
            .get_mut(&alias.to_string())
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::RifType;
    use super::*;

    fn vrf(raw: u64) -> VirtualRouterOid {
        VirtualRouterOid::from_raw(raw).unwrap()
    }

    fn entry_with_prefix(vrf_id: VirtualRouterOid, prefix: &str) -> IntfsEntry {
        let mut entry = IntfsEntry::new(
            RouterInterfaceOid::from_raw(0x42).unwrap(),
            RifType::Port,
            vrf_id,
        );
        entry.ip_addresses.insert(prefix.parse().unwrap());
        entry
    }

    #[test]
    fn test_lookup_and_refcount() {
        let registry = RifRegistry::new();
        registry.insert(
            "Ethernet4".to_string(),
            entry_with_prefix(vrf(1), "10.0.0.1/24"),
        );

        assert!(registry.contains("Ethernet4"));
        assert!(registry.router_intf_id("Ethernet4").is_some());
        assert!(registry.router_intf_id("Ethernet8").is_none());

        assert_eq!(registry.increase_ref_count("Ethernet4").unwrap(), 1);
        assert_eq!(registry.ref_count("Ethernet4"), Some(1));
        assert_eq!(registry.decrease_ref_count("Ethernet4").unwrap(), 0);
        assert!(registry.increase_ref_count("Ethernet8").is_err());
    }

    #[test]
    fn test_alias_for_respects_vrf() {
        let registry = RifRegistry::new();
        registry.insert(
            "Ethernet4".to_string(),
            entry_with_prefix(vrf(1), "10.0.0.1/24"),
        );
        registry.insert(
            "Ethernet8".to_string(),
            entry_with_prefix(vrf(2), "10.0.1.1/24"),
        );

        let ip: IpAddress = "10.0.0.9".parse().unwrap();
        assert_eq!(registry.alias_for(&ip, vrf(1)), Some("Ethernet4".into()));
        assert_eq!(registry.alias_for(&ip, vrf(2)), None);
    }

    #[test]
    fn test_find_overlap_scans_all_aliases() {
        let registry = RifRegistry::new();
        registry.insert(
            "Ethernet4".to_string(),
            entry_with_prefix(vrf(1), "10.0.0.1/24"),
        );

        // Overlap on a different alias within the same VRF
        let candidate: IpPrefix = "10.0.0.2/24".parse().unwrap();
        let (alias, _) = registry.find_overlap(vrf(1), &candidate).unwrap();
        assert_eq!(alias, "Ethernet4");

        // No conflict across VRFs
        assert!(registry.find_overlap(vrf(2), &candidate).is_none());

        // Disjoint subnets do not conflict
        let disjoint: IpPrefix = "10.0.1.1/24".parse().unwrap();
        assert!(registry.find_overlap(vrf(1), &disjoint).is_none());
    }

    #[test]
    fn test_is_prefix_subnet_normalizes() {
        let registry = RifRegistry::new();
        registry.insert(
            "Ethernet4".to_string(),
            entry_with_prefix(vrf(1), "10.0.0.1/24"),
        );

        let other_host: IpPrefix = "10.0.0.7/24".parse().unwrap();
        assert!(registry.is_prefix_subnet(&other_host, "Ethernet4"));
        let elsewhere: IpPrefix = "10.1.0.7/24".parse().unwrap();
        assert!(!registry.is_prefix_subnet(&elsewhere, "Ethernet4"));
    }
}
