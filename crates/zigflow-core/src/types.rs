/*!
 * Core data types for ZigFlow.
 *
 * This module defines the addressing and identifier types shared by every
 * ZigFlow crate.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for ZigFlow resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

/// Endpoint identifier within a node (1..=240 for application endpoints)
pub type EndpointId = u8;

/// Cluster identifier
pub type ClusterId = u16;

/// Application profile identifier
pub type ProfileId = u16;

/// 16-bit network (short) address assigned when a node joins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkAddress(pub u16);

impl NetworkAddress {
    /// Address of the network coordinator
    pub const COORDINATOR: NetworkAddress = NetworkAddress(0x0000);

    /// Create a network address from its raw value
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw 16-bit value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Whether this is the coordinator address
    pub fn is_coordinator(self) -> bool {
        self == Self::COORDINATOR
    }

    /// Whether this is one of the reserved broadcast addresses (0xFFF8..=0xFFFF)
    pub fn is_broadcast(self) -> bool {
        self.0 >= 0xFFF8
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for NetworkAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// 64-bit IEEE (extended) address burned into the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedAddress(pub u64);

impl ExtendedAddress {
    /// Raw 64-bit value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExtendedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl From<u64> for ExtendedAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl FromStr for ExtendedAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != 16 {
            return Err(Error::other(format!("Invalid IEEE address: {}", s)));
        }
        u64::from_str_radix(&hex, 16)
            .map(Self)
            .map_err(|e| Error::other(format!("Invalid IEEE address {}: {}", s, e)))
    }
}
