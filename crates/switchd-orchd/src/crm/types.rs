//! CRM resource classes and counter entries.

use std::fmt;
use switchd_types::{IpAddress, IpPrefix};

/// The counted hardware resource classes, keyed by address family and
/// object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmResource {
    Ipv4Route,
    Ipv6Route,
    Ipv4Neighbor,
    Ipv6Neighbor,
    Ipv4NextHop,
    Ipv6NextHop,
}

impl CrmResource {
    /// All resource classes, for iteration and initialization.
    pub const ALL: [CrmResource; 6] = [
        CrmResource::Ipv4Route,
        CrmResource::Ipv6Route,
        CrmResource::Ipv4Neighbor,
        CrmResource::Ipv6Neighbor,
        CrmResource::Ipv4NextHop,
        CrmResource::Ipv6NextHop,
    ];

    /// Route class for the address family of a prefix.
    pub fn route_for(prefix: &IpPrefix) -> Self {
        if prefix.is_ipv4() {
            CrmResource::Ipv4Route
        } else {
            CrmResource::Ipv6Route
        }
    }

    /// Neighbor class for the address family of an address.
    pub fn neighbor_for(ip: &IpAddress) -> Self {
        if ip.is_ipv4() {
            CrmResource::Ipv4Neighbor
        } else {
            CrmResource::Ipv6Neighbor
        }
    }

    /// Next-hop class for the address family of an address.
    pub fn next_hop_for(ip: &IpAddress) -> Self {
        if ip.is_ipv4() {
            CrmResource::Ipv4NextHop
        } else {
            CrmResource::Ipv6NextHop
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CrmResource::Ipv4Route => "ipv4_route",
            CrmResource::Ipv6Route => "ipv6_route",
            CrmResource::Ipv4Neighbor => "ipv4_neighbor",
            CrmResource::Ipv6Neighbor => "ipv6_neighbor",
            CrmResource::Ipv4NextHop => "ipv4_nexthop",
            CrmResource::Ipv6NextHop => "ipv6_nexthop",
        }
    }
}

impl fmt::Display for CrmResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a threshold is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrmThresholdType {
    /// Percent of capacity used.
    #[default]
    Percentage,
    /// Absolute used count.
    Used,
    /// Absolute free count.
    Free,
}

/// Counter state for one resource class.
#[derive(Debug, Clone)]
pub struct CrmResourceEntry {
    pub used: u32,
    pub capacity: u32,
    pub threshold_type: CrmThresholdType,
    pub high_threshold: u32,
    pub low_threshold: u32,
    /// Whether the high threshold is currently exceeded.
    pub exceeded: bool,
}

impl Default for CrmResourceEntry {
    fn default() -> Self {
        Self {
            used: 0,
            capacity: 1024,
            threshold_type: CrmThresholdType::Percentage,
            high_threshold: 85,
            low_threshold: 70,
            exceeded: false,
        }
    }
}

impl CrmResourceEntry {
    /// The value the thresholds compare against.
    pub fn threshold_value(&self) -> u32 {
        match self.threshold_type {
            CrmThresholdType::Percentage => {
                if self.capacity == 0 {
                    0
                } else {
                    (u64::from(self.used) * 100 / u64::from(self.capacity)) as u32
                }
            }
            CrmThresholdType::Used => self.used,
            CrmThresholdType::Free => self.capacity.saturating_sub(self.used),
        }
    }

    /// True if the current value crosses the high threshold. For `Free`
    /// thresholds the comparison direction inverts.
    pub fn is_above_high(&self) -> bool {
        match self.threshold_type {
            CrmThresholdType::Free => self.threshold_value() <= self.high_threshold,
            _ => self.threshold_value() >= self.high_threshold,
        }
    }

    /// True once the value is back under the low threshold.
    pub fn is_below_low(&self) -> bool {
        match self.threshold_type {
            CrmThresholdType::Free => self.threshold_value() > self.low_threshold,
            _ => self.threshold_value() < self.low_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_mapping() {
        let v4: IpAddress = "192.0.2.1".parse().unwrap();
        let v6: IpAddress = "2001:db8::1".parse().unwrap();
        assert_eq!(CrmResource::neighbor_for(&v4), CrmResource::Ipv4Neighbor);
        assert_eq!(CrmResource::neighbor_for(&v6), CrmResource::Ipv6Neighbor);
        assert_eq!(CrmResource::next_hop_for(&v4), CrmResource::Ipv4NextHop);

        let p4: IpPrefix = "10.0.0.1/32".parse().unwrap();
        assert_eq!(CrmResource::route_for(&p4), CrmResource::Ipv4Route);
    }

    #[test]
    fn test_percentage_threshold() {
        let mut entry = CrmResourceEntry::default();
        entry.capacity = 100;
        entry.used = 90;
        assert_eq!(entry.threshold_value(), 90);
        assert!(entry.is_above_high());

        entry.used = 50;
        assert!(entry.is_below_low());
    }

    #[test]
    fn test_free_threshold_inverts() {
        let entry = CrmResourceEntry {
            used: 1000,
            capacity: 1024,
            threshold_type: CrmThresholdType::Free,
            high_threshold: 50,
            low_threshold: 100,
            exceeded: false,
        };
        // 24 free <= 50 high
        assert!(entry.is_above_high());
        assert!(!entry.is_below_low());
    }
}
