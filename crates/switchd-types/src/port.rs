//! Port classification and state enums.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of switch port, as seen by the router-interface layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// CPU port for control plane traffic.
    Cpu,
    /// Physical front-panel port.
    Phy,
    /// Link Aggregation Group (port-channel).
    Lag,
    /// VLAN interface (SVI).
    Vlan,
    /// Sub-interface carved out of a physical port.
    SubPort,
    /// Loopback interface (no hardware binding).
    Loopback,
}

impl PortType {
    /// Returns true if a router interface on this port is backed by hardware.
    pub const fn has_hardware_rif(&self) -> bool {
        !matches!(self, PortType::Loopback | PortType::Cpu)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortType::Cpu => "cpu",
            PortType::Phy => "phy",
            PortType::Lag => "lag",
            PortType::Vlan => "vlan",
            PortType::SubPort => "subport",
            PortType::Loopback => "loopback",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PortType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(PortType::Cpu),
            "phy" => Ok(PortType::Phy),
            "lag" => Ok(PortType::Lag),
            "vlan" => Ok(PortType::Vlan),
            "subport" => Ok(PortType::SubPort),
            "loopback" => Ok(PortType::Loopback),
            _ => Err(ParseError::InvalidPortType(s.to_string())),
        }
    }
}

/// Administrative state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// Port is administratively down (default for new ports).
    #[default]
    Down,
    /// Port is administratively up.
    Up,
}

impl AdminState {
    pub const fn is_up(&self) -> bool {
        matches!(self, AdminState::Up)
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminState::Up => write!(f, "up"),
            AdminState::Down => write!(f, "down"),
        }
    }
}

impl FromStr for AdminState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(AdminState::Up),
            "down" => Ok(AdminState::Down),
            _ => Err(ParseError::InvalidPortType(format!(
                "invalid admin state: {}",
                s
            ))),
        }
    }
}

/// Operational state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    /// Port is operationally down (default).
    #[default]
    Down,
    /// Port is operationally up.
    Up,
    /// Port state is unknown/not available.
    Unknown,
}

impl OperState {
    pub const fn is_up(&self) -> bool {
        matches!(self, OperState::Up)
    }

    pub const fn is_down(&self) -> bool {
        matches!(self, OperState::Down)
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperState::Up => write!(f, "up"),
            OperState::Down => write!(f, "down"),
            OperState::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for OperState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(OperState::Up),
            "down" => Ok(OperState::Down),
            "unknown" => Ok(OperState::Unknown),
            _ => Err(ParseError::InvalidPortType(format!(
                "invalid oper state: {}",
                s
            ))),
        }
    }
}
