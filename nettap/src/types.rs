//! Core identifier and payload types shared across the harness.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::GatewayError;

/// Name of the sentinel hook on the classifier node.
///
/// The sentinel is reserved: it exists before any harness-created hook and
/// cannot be created or removed. Classifying an address to it clears the
/// address's rule instead of recording one.
pub const DEFAULT_HOOK: &str = "default";

/// A fixed-width (6-byte) hardware address, the classification key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Raw octets of the address.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Build a distinct address from a counter value.
    ///
    /// Scenarios use this to mint disjoint key sets: the counter is written
    /// big-endian into the low five bytes, with a fixed locally-administered
    /// first byte so generated keys never collide with real interfaces.
    pub fn from_index(index: u64) -> Self {
        let b = index.to_be_bytes();
        MacAddr([0x02, b[3], b[4], b[5], b[6], b[7]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| GatewayError::ParseFailure(format!("short MAC address: {s}")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| GatewayError::ParseFailure(format!("bad MAC octet in: {s}")))?;
        }
        if parts.next().is_some() {
            return Err(GatewayError::ParseFailure(format!("long MAC address: {s}")));
        }
        Ok(MacAddr(bytes))
    }
}

/// Capability of a node in the two-node topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Classifies traffic by hardware address into one of its hooks.
    Classifier,
    /// Replicates traffic received on one hook across enabled output links.
    FanOut,
}

/// One hook as observed through `QueryHooks`: its name and the number of
/// classification rules currently routed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    /// Hook name, unique within its node at the observation instant.
    pub name: String,
    /// Number of address rules owned by this hook.
    pub rules: u64,
}

bitflags! {
    /// Link-enabled mask passed to `Configure` on the fan-out node.
    ///
    /// Bit N enables output link N. The mask is forwarded to the subsystem
    /// unchanged; the oracle does not model per-link delivery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LinkMask: u32 {
        /// Output link 0.
        const LINK0 = 1 << 0;
        /// Output link 1.
        const LINK1 = 1 << 1;
        /// Output link 2.
        const LINK2 = 1 << 2;
        /// Output link 3.
        const LINK3 = 1 << 3;
        /// Output link 4.
        const LINK4 = 1 << 4;
        /// Output link 5.
        const LINK5 = 1 << 5;
        /// Output link 6.
        const LINK6 = 1 << 6;
        /// Output link 7.
        const LINK7 = 1 << 7;
    }
}

impl LinkMask {
    /// Mask with the first `n` links enabled.
    pub fn first(n: u32) -> Self {
        if n >= 32 {
            LinkMask::from_bits_retain(u32::MAX)
        } else {
            LinkMask::from_bits_retain((1u32 << n) - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_addr_roundtrip() {
        let addr: MacAddr = "02:00:de:ad:be:ef".parse().expect("parse");
        assert_eq!(addr.to_string(), "02:00:de:ad:be:ef");
    }

    #[test]
    fn mac_addr_rejects_short_and_long() {
        assert!("02:00:de:ad:be".parse::<MacAddr>().is_err());
        assert!("02:00:de:ad:be:ef:00".parse::<MacAddr>().is_err());
        assert!("02:00:de:ad:be:zz".parse::<MacAddr>().is_err());
    }

    #[test]
    fn from_index_is_injective_over_scenario_ranges() {
        let a = MacAddr::from_index(1);
        let b = MacAddr::from_index(2);
        let c = MacAddr::from_index(0x1_0001);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "02:00:00:00:00:01");
    }

    #[test]
    fn link_mask_first() {
        assert_eq!(LinkMask::first(3), LinkMask::LINK0 | LinkMask::LINK1 | LinkMask::LINK2);
        assert!(LinkMask::first(8).contains(LinkMask::LINK7));
    }
}
