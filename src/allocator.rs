//! Sequential Allocator
//!
//! Hands out addresses from a subnet one request at a time.
//!
//! ## Search Order
//! The search starts just after the last address any instance reserved and
//! walks the effective range with wraparound, so consecutive allocations
//! spread round-robin across the range instead of piling up at its start.
//!
//! ```text
//!            start                  marker                  end (exclusive)
//!              │                      │                      │
//!              ▼                      ▼                      ▼
//!   range:     [ .  .  .  .  .  .  .  M  1  2  3  .  .  .  ) ──┐
//!                 4  5  6  .  .  .  ◄──────────────────────────┘
//!                                     │
//!                            stops before M
//! ```
//!
//! The store lock is held for the whole of `allocate`/`release`, search
//! loop included, so two instances can never claim the same candidate.

use std::fmt;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use crate::config::{IpamConfig, Route};
use crate::error::{IpamError, Result};
use crate::net::{network_range, next_address, octets, validate_in_range, Subnet};
use crate::store::{Store, StoreGuard};

/// Result of a successful allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpConfig {
    /// Address handed out
    pub address: IpAddr,

    /// Mask of the subnet it came from
    pub mask: Vec<u8>,

    /// Gateway for the subnet
    pub gateway: IpAddr,

    /// Routes passed through from the configuration
    pub routes: Vec<Route>,
}

impl IpConfig {
    /// The allocated address with its subnet mask
    pub fn address_with_mask(&self) -> Subnet {
        Subnet::with_mask(self.address, self.mask.clone())
    }
}

impl fmt::Display for IpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address_with_mask().prefix_len() {
            Some(len) => writeln!(f, "address: {}/{}", self.address, len)?,
            None => writeln!(f, "address: {}", self.address_with_mask())?,
        }
        write!(f, "gateway: {}", self.gateway)?;
        for route in &self.routes {
            write!(f, "\nroute: {}", route)?;
        }
        Ok(())
    }
}

/// The `[start, end)` window an allocator searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRange {
    /// First candidate (inclusive)
    pub start: IpAddr,

    /// Bound (exclusive); all zeroes when the range runs to the top of the
    /// address space
    pub end: IpAddr,
}

impl EffectiveRange {
    /// Whether `addr` is a candidate of this range
    pub fn contains(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.start.is_ipv4() {
            return false;
        }
        if self.start < self.end {
            self.start <= addr && addr < self.end
        } else if is_zero(&self.end) {
            self.start <= addr
        } else {
            false
        }
    }

    /// Whether the range has no candidates at all
    pub fn is_empty(&self) -> bool {
        !self.contains(self.start)
    }

    /// The address after `cur`, wrapping from the end bound back to the start
    ///
    /// May return the end bound itself; the search never reserves it
    /// because it is not `contains`-ed.
    pub fn next_ip(&self, cur: IpAddr) -> IpAddr {
        if cur == self.end {
            self.start
        } else {
            next_address(cur)
        }
    }
}

/// Allocates addresses from one subnet, sequentially and round-robin
pub struct SequentialAllocator<S: Store> {
    /// Frozen at construction
    range: EffectiveRange,

    /// Network being allocated from
    config: IpamConfig,

    /// Reservation store for this network
    store: S,
}

impl<S: Store> SequentialAllocator<S> {
    /// Create an allocator, computing its effective range
    ///
    /// 1. Start from the subnet's network and broadcast addresses
    /// 2. Skip the network address
    /// 3. A configured range start replaces the start as-is
    /// 4. A configured (inclusive) range end becomes the exclusive bound
    ///
    /// Performs no I/O. Fails with `InvalidSubnet` or `InvalidRange`.
    pub fn new(config: IpamConfig, store: S) -> Result<Self> {
        let (network, broadcast) = network_range(&config.subnet)?;

        let mut start = next_address(network);
        let mut end = broadcast;

        if let Some(range_start) = config.range_start {
            validate_in_range(range_start, &config.subnet)?;
            start = range_start;
        }
        if let Some(range_end) = config.range_end {
            validate_in_range(range_end, &config.subnet)?;
            if range_end < start {
                return Err(IpamError::InvalidRange(format!(
                    "range end {} before range start {}",
                    range_end, start
                )));
            }
            end = next_address(range_end);
        }

        Ok(Self {
            range: EffectiveRange { start, end },
            config,
            store,
        })
    }

    /// Allocate an address for `id`
    ///
    /// With a requested address, reserves exactly that address or fails.
    /// Otherwise searches the effective range, skipping the gateway.
    pub fn allocate(&mut self, id: &str) -> Result<IpConfig> {
        let gateway = self.gateway();
        let mut store = StoreGuard::acquire(&mut self.store)?;

        let address = match self.config.requested_ip {
            Some(requested) => {
                if requested == gateway {
                    return Err(IpamError::InvalidRequest(gateway));
                }
                if !self.config.subnet.contains(requested) {
                    return Err(IpamError::OutOfRange {
                        addr: requested,
                        subnet: self.config.subnet.to_string(),
                    });
                }
                if !store.reserve(id, requested)? {
                    return Err(IpamError::AddressUnavailable {
                        addr: requested,
                        network: self.config.name.clone(),
                    });
                }
                requested
            }
            None => search(&mut *store, &self.range, &self.config.name, gateway, id)?,
        };

        store.release()?;

        info!(
            network = %self.config.name,
            owner = id,
            %address,
            "allocated address"
        );

        Ok(IpConfig {
            address,
            mask: self.config.subnet.mask().to_vec(),
            gateway,
            routes: self.config.routes.clone(),
        })
    }

    /// Release every address held by `id`
    ///
    /// Releasing an owner with nothing reserved succeeds.
    pub fn release(&mut self, id: &str) -> Result<()> {
        let mut store = StoreGuard::acquire(&mut self.store)?;
        store.release_by_id(id)?;
        store.release()?;

        debug!(network = %self.config.name, owner = id, "released owner");
        Ok(())
    }

    /// The configured gateway, or the address right after the network address
    pub fn gateway(&self) -> IpAddr {
        self.config
            .gateway
            .unwrap_or_else(|| next_address(self.config.subnet.addr()))
    }

    /// The frozen `[start, end)` search window
    pub fn effective_range(&self) -> EffectiveRange {
        self.range
    }

    /// Network configuration
    pub fn config(&self) -> &IpamConfig {
        &self.config
    }

    /// Borrow the store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the store
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back
    pub fn into_store(self) -> S {
        self.store
    }
}

/// Walk the range for a free candidate (store lock held by the caller)
fn search<S: Store + ?Sized>(
    store: &mut S,
    range: &EffectiveRange,
    network: &str,
    gateway: IpAddr,
    id: &str,
) -> Result<IpAddr> {
    if range.is_empty() {
        return Err(IpamError::PoolExhausted {
            network: network.to_string(),
        });
    }

    let (search_start, search_end) = search_range(store, range, network);
    debug!(network, %search_start, %search_end, "searching for a free address");

    let mut cur = search_start;
    while cur != search_end {
        if cur != gateway && range.contains(cur) && store.reserve(id, cur)? {
            return Ok(cur);
        }
        cur = range.next_ip(cur);
    }

    Err(IpamError::PoolExhausted {
        network: network.to_string(),
    })
}

/// Where a search begins and ends
///
/// Seeded from the last-reserved marker when it still lies inside the
/// effective range: begin right after it and stop on reaching it again.
/// Otherwise cover the effective range from its start.
fn search_range<S: Store + ?Sized>(
    store: &mut S,
    range: &EffectiveRange,
    network: &str,
) -> (IpAddr, IpAddr) {
    match store.last_reserved_ip() {
        Ok(Some(marker)) if range.contains(marker) => (range.next_ip(marker), marker),
        Ok(Some(marker)) => {
            debug!(network, %marker, "last reserved address outside range, ignoring");
            (range.start, range.end)
        }
        Ok(None) => (range.start, range.end),
        Err(e) => {
            warn!(network, error = %e, "failed to read last reserved address");
            (range.start, range.end)
        }
    }
}

fn is_zero(addr: &IpAddr) -> bool {
    octets(addr).iter().all(|b| *b == 0)
}
