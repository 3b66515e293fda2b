//! IP address and prefix types with safe parsing and subnet arithmetic.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address wrapper with switch-specific utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);
    pub const BROADCAST: Self = Ipv4Address(Ipv4Addr::BROADCAST);
    pub const LOCALHOST: Self = Ipv4Address(Ipv4Addr::LOCALHOST);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn inner(&self) -> Ipv4Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Returns the address as a host-order u32 for mask arithmetic.
    pub fn to_bits(&self) -> u32 {
        u32::from_be_bytes(self.0.octets())
    }

    /// Builds an address from a host-order u32.
    pub fn from_bits(bits: u32) -> Self {
        Ipv4Address(Ipv4Addr::from(bits.to_be_bytes()))
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

/// An IPv6 address wrapper with switch-specific utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv6Address(Ipv6Addr);

impl Ipv6Address {
    pub const UNSPECIFIED: Self = Ipv6Address(Ipv6Addr::UNSPECIFIED);
    pub const LOCALHOST: Self = Ipv6Address(Ipv6Addr::LOCALHOST);

    pub const fn inner(&self) -> Ipv6Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }

    pub const fn segments(&self) -> [u16; 8] {
        self.0.segments()
    }

    /// Returns true if this is a link-local address (fe80::/10).
    pub fn is_link_local(&self) -> bool {
        let segments = self.segments();
        (segments[0] & 0xffc0) == 0xfe80
    }

    /// Returns the address as a host-order u128 for mask arithmetic.
    pub fn to_bits(&self) -> u128 {
        u128::from_be_bytes(self.0.octets())
    }

    /// Builds an address from a host-order u128.
    pub fn from_bits(bits: u128) -> Self {
        Ipv6Address(Ipv6Addr::from(bits.to_be_bytes()))
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv6Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv6Addr>()
            .map(Ipv6Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Address(addr)
    }
}

impl From<Ipv6Address> for Ipv6Addr {
    fn from(addr: Ipv6Address) -> Self {
        addr.0
    }
}

/// An IP address that can be either IPv4 or IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    /// Returns true if this is an IPv4 address.
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    /// Returns true if this is an IPv6 address.
    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Returns the IPv4 address if this is V4, None otherwise.
    pub const fn as_ipv4(&self) -> Option<&Ipv4Address> {
        match self {
            IpAddress::V4(addr) => Some(addr),
            IpAddress::V6(_) => None,
        }
    }

    /// Returns the IPv6 address if this is V6, None otherwise.
    pub const fn as_ipv6(&self) -> Option<&Ipv6Address> {
        match self {
            IpAddress::V4(_) => None,
            IpAddress::V6(addr) => Some(addr),
        }
    }

    /// Returns true if this is the all-zero address of its family.
    pub fn is_unspecified(&self) -> bool {
        match self {
            IpAddress::V4(addr) => *addr == Ipv4Address::UNSPECIFIED,
            IpAddress::V6(addr) => *addr == Ipv6Address::UNSPECIFIED,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse::<Ipv6Address>().map(IpAddress::V6)
        } else {
            s.parse::<Ipv4Address>().map(IpAddress::V4)
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Address> for IpAddress {
    fn from(addr: Ipv6Address) -> Self {
        IpAddress::V6(addr)
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(Ipv4Address(addr))
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(Ipv6Address(addr))
    }
}

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
///
/// The stored address may be an interface address rather than the network
/// address; [`IpPrefix::subnet`] normalizes when the network form is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address type
    /// (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = match address {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        };

        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for address type",
                prefix_len, max_len
            )));
        }

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// Creates the host prefix for an address (/32 or /128).
    pub fn host(address: IpAddress) -> Self {
        let prefix_len = match address {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        };
        IpPrefix {
            address,
            prefix_len,
        }
    }

    /// Returns the address of this prefix as configured.
    pub const fn address(&self) -> &IpAddress {
        &self.address
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if this is an IPv4 prefix.
    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    /// Returns true if this is an IPv6 prefix.
    pub const fn is_ipv6(&self) -> bool {
        self.address.is_ipv6()
    }

    /// Returns true if this is a host route (/32 for IPv4, /128 for IPv6).
    pub const fn is_host_route(&self) -> bool {
        match self.address {
            IpAddress::V4(_) => self.prefix_len == 32,
            IpAddress::V6(_) => self.prefix_len == 128,
        }
    }

    /// Returns true if this is the default route (0.0.0.0/0 or ::/0).
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    /// Returns the network address (configured address with host bits cleared).
    pub fn network(&self) -> IpAddress {
        match self.address {
            IpAddress::V4(addr) => {
                IpAddress::V4(Ipv4Address::from_bits(addr.to_bits() & self.v4_mask()))
            }
            IpAddress::V6(addr) => {
                IpAddress::V6(Ipv6Address::from_bits(addr.to_bits() & self.v6_mask()))
            }
        }
    }

    /// Returns this prefix normalized to its network form.
    pub fn subnet(&self) -> IpPrefix {
        IpPrefix {
            address: self.network(),
            prefix_len: self.prefix_len,
        }
    }

    /// Returns true if the given address falls inside this prefix's subnet.
    ///
    /// Addresses of the other family are never contained.
    pub fn contains(&self, ip: &IpAddress) -> bool {
        match (self.address, ip) {
            (IpAddress::V4(net), IpAddress::V4(addr)) => {
                let mask = self.v4_mask();
                net.to_bits() & mask == addr.to_bits() & mask
            }
            (IpAddress::V6(net), IpAddress::V6(addr)) => {
                let mask = self.v6_mask();
                net.to_bits() & mask == addr.to_bits() & mask
            }
            _ => false,
        }
    }

    /// Returns true if the two prefixes' subnets overlap.
    ///
    /// Two prefixes overlap when either one contains the other's configured
    /// address.
    pub fn overlaps(&self, other: &IpPrefix) -> bool {
        self.contains(other.address()) || other.contains(self.address())
    }

    /// Returns the directed broadcast address of an IPv4 subnet.
    ///
    /// /31 and /32 subnets (and all IPv6 prefixes) have no broadcast address.
    pub fn broadcast_address(&self) -> Option<Ipv4Address> {
        match self.address {
            IpAddress::V4(addr) if self.prefix_len <= 30 => {
                let mask = self.v4_mask();
                Some(Ipv4Address::from_bits(addr.to_bits() & mask | !mask))
            }
            _ => None,
        }
    }

    fn v4_mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    fn v6_mask(&self) -> u128 {
        if self.prefix_len == 0 {
            0
        } else {
            u128::MAX << (128 - u32::from(self.prefix_len))
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}
