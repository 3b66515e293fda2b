//! Neighbor and next-hop entry types.

use std::fmt;
use switchd_hal::NextHopOid;
use switchd_orch_common::HasRefCount;
use switchd_types::IpAddress;

/// Identity of a neighbor: the resolved address and the interface it was
/// learned on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NeighborEntry {
    pub ip: IpAddress,
    pub alias: String,
}

impl NeighborEntry {
    pub fn new(ip: IpAddress, alias: impl Into<String>) -> Self {
        Self {
            ip,
            alias: alias.into(),
        }
    }

    /// The key of the next-hop paired with this neighbor.
    pub fn next_hop_key(&self) -> NextHopKey {
        NextHopKey {
            ip: self.ip,
            alias: self.alias.clone(),
        }
    }
}

impl fmt::Display for NeighborEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ip, self.alias)
    }
}

/// Identity of a next-hop: destination address and egress interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NextHopKey {
    pub ip: IpAddress,
    pub alias: String,
}

impl NextHopKey {
    pub fn new(ip: IpAddress, alias: impl Into<String>) -> Self {
        Self {
            ip,
            alias: alias.into(),
        }
    }
}

impl fmt::Display for NextHopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ip, self.alias)
    }
}

/// State flags on a next-hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NextHopFlags(u32);

impl NextHopFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// The egress interface is operationally down; the next-hop must not
    /// participate in forwarding groups.
    pub const IF_DOWN: Self = Self(1 << 0);

    pub fn contains(&self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }

    pub fn is_if_down(&self) -> bool {
        self.contains(Self::IF_DOWN)
    }
}

/// Tracked state of one next-hop object.
#[derive(Debug, Clone)]
pub struct NextHopEntry {
    /// Hardware object id.
    pub id: NextHopOid,
    pub flags: NextHopFlags,
    ref_count: u32,
}

impl NextHopEntry {
    pub fn new(id: NextHopOid) -> Self {
        Self {
            id,
            flags: NextHopFlags::NONE,
            ref_count: 0,
        }
    }
}

impl HasRefCount for NextHopEntry {
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
