//! Subnet type
//!
//! An address paired with raw mask bytes. The mask is kept as bytes rather
//! than a prefix length so malformed, mixed-width input can be represented
//! and rejected by the range math instead of at parse time.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{IpamError, Result};

use super::{from_octets, octets};

/// A network address plus mask
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subnet {
    addr: IpAddr,
    mask: Vec<u8>,
}

impl Subnet {
    /// Create a subnet from an address and prefix length
    ///
    /// The address is masked down to its network address, so
    /// `10.0.0.7/24` becomes `10.0.0.0/24`.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let width = octets(&addr).len();
        if prefix_len as usize > width * 8 {
            return Err(IpamError::InvalidSubnet(format!(
                "prefix length {} too long for {}",
                prefix_len, addr
            )));
        }

        let mask = mask_from_prefix(prefix_len, width);
        let network: Vec<u8> = octets(&addr).iter().zip(&mask).map(|(b, m)| b & m).collect();
        let addr = from_octets(&network)
            .ok_or_else(|| IpamError::InvalidSubnet(format!("unsupported address {}", addr)))?;

        Ok(Self { addr, mask })
    }

    /// Create a subnet from an address and raw mask bytes, unchecked
    pub fn with_mask(addr: IpAddr, mask: Vec<u8>) -> Self {
        Self { addr, mask }
    }

    /// The subnet's address
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The raw mask bytes
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Number of leading one bits, if the mask is contiguous
    pub fn prefix_len(&self) -> Option<u8> {
        let ones: u32 = self.mask.iter().map(|b| b.count_ones()).sum();
        let expected = mask_from_prefix(ones as u8, self.mask.len());
        (expected == self.mask).then_some(ones as u8)
    }

    /// Whether `addr` is inside this subnet
    ///
    /// Addresses of a different width, or a subnet whose mask does not
    /// match its address width, never contain anything.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let net = octets(&self.addr);
        let candidate = octets(&addr);
        if net.len() != self.mask.len() || candidate.len() != net.len() {
            return false;
        }

        net.iter()
            .zip(&candidate)
            .zip(&self.mask)
            .all(|((n, c), m)| n & m == c & m)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix_len() {
            Some(len) => write!(f, "{}/{}", self.addr, len),
            None => {
                write!(f, "{}/", self.addr)?;
                for b in &self.mask {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Subnet {
    type Err = IpamError;

    /// Parse CIDR notation: `10.0.0.0/24` or `fd00::/64`
    fn from_str(s: &str) -> Result<Self> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| IpamError::InvalidSubnet(format!("missing prefix length in {:?}", s)))?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|e| IpamError::InvalidSubnet(format!("bad address in {:?}: {}", s, e)))?;
        let len: u8 = len
            .parse()
            .map_err(|e| IpamError::InvalidSubnet(format!("bad prefix length in {:?}: {}", s, e)))?;

        Self::new(addr, len)
    }
}

/// Build a contiguous mask of `prefix_len` one bits over `width` bytes
fn mask_from_prefix(prefix_len: u8, width: usize) -> Vec<u8> {
    let mut remaining = prefix_len as usize;
    (0..width)
        .map(|_| {
            let bits = remaining.min(8);
            remaining -= bits;
            if bits == 0 {
                0
            } else {
                0xffu8 << (8 - bits)
            }
        })
        .collect()
}
