//! Range arithmetic over subnets

use std::net::IpAddr;

use crate::error::{IpamError, Result};

use super::{from_octets, octets, Subnet};

/// Compute the first and last address of a subnet
///
/// The first address is the subnet's own address. The last is built by
/// OR-ing every address byte with the inverted mask byte, which yields the
/// broadcast (all host bits set) address.
///
/// Fails with `InvalidSubnet` when the address and mask differ in width.
pub fn network_range(subnet: &Subnet) -> Result<(IpAddr, IpAddr)> {
    let addr = subnet.addr();
    let bytes = octets(&addr);
    let mask = subnet.mask();

    if bytes.len() != mask.len() {
        return Err(IpamError::InvalidSubnet(format!(
            "address {} is {} bytes but mask is {} bytes",
            addr,
            bytes.len(),
            mask.len()
        )));
    }

    let last: Vec<u8> = bytes.iter().zip(mask).map(|(b, m)| b | !m).collect();
    let last = from_octets(&last)
        .ok_or_else(|| IpamError::InvalidSubnet(format!("unsupported address width for {}", addr)))?;

    Ok((addr, last))
}

/// The address numerically one greater than `addr`
///
/// Carries across every byte. Stepping past the top of the address space
/// wraps to all zeroes; callers detect that by range comparison.
pub fn next_address(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => IpAddr::V4(u32::from(v4).wrapping_add(1).into()),
        IpAddr::V6(v6) => IpAddr::V6(u128::from(v6).wrapping_add(1).into()),
    }
}

/// Check that `addr` lies inside `subnet`
pub fn validate_in_range(addr: IpAddr, subnet: &Subnet) -> Result<()> {
    if subnet.contains(addr) {
        Ok(())
    } else {
        Err(IpamError::InvalidRange(format!("{} not in network {}", addr, subnet)))
    }
}
