//! Network primitive types for the switchd control plane.
//!
//! Every layer of the stack that talks about addresses goes through these
//! wrappers rather than bare strings:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes with subnet arithmetic
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`AdminState`] / [`OperState`]: port state enums

mod ip;
mod mac;
mod port;
mod vlan;

pub use ip::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use port::{AdminState, OperState, PortType};
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid port type: {0}")]
    InvalidPortType(String),
}
