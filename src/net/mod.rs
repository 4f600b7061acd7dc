//! Address Range Math
//!
//! Pure functions over fixed-width addresses. Nothing here touches state.
//!
//! ## Responsibilities
//! - Represent a subnet as an address plus raw mask bytes
//! - Compute a subnet's first (network) and last (all host bits set) address
//! - Step to the numerically next address with carry
//! - Membership checks used to validate ranges and requested addresses
//!
//! Addresses are either 4 or 16 bytes wide. The arithmetic treats them as
//! big-endian integers and never interprets IPv6-specific structure.

mod math;
mod subnet;

pub use math::{network_range, next_address, validate_in_range};
pub use subnet::Subnet;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Width in bytes of an IPv4 address
pub const V4_WIDTH: usize = 4;

/// Width in bytes of an IPv6 address
pub const V6_WIDTH: usize = 16;

/// Big-endian bytes of an address
pub fn octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Rebuild an address from its big-endian bytes
///
/// Returns `None` unless `bytes` is exactly 4 or 16 bytes long.
pub fn from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        V4_WIDTH => {
            let arr: [u8; V4_WIDTH] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(arr)))
        }
        V6_WIDTH => {
            let arr: [u8; V6_WIDTH] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(arr)))
        }
        _ => None,
    }
}
