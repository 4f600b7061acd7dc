//! Configuration for hostlocal
//!
//! Two halves: `StoreConfig` says where and how reservations are persisted,
//! `IpamConfig` describes the network being allocated from. Both come with
//! builders and sensible defaults.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{IpamError, Result};
use crate::net::Subnet;

// =============================================================================
// Store Configuration
// =============================================================================

/// Where and how the reservation store keeps its files
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per network
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {network name}/
    ///           ├── lock
    ///           ├── reservations.wal
    ///           └── reservations.snap
    pub data_dir: PathBuf,

    /// When to fsync the journal
    pub sync_strategy: SyncStrategy,

    /// Journal entries tolerated before unlock compacts them into a snapshot
    pub compact_threshold: usize,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest)
    EveryWrite,

    /// fsync once, right before the lock is released
    OnUnlock,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/cni/networks"),
            sync_strategy: SyncStrategy::EveryWrite,
            compact_threshold: 256,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the data directory (root for all networks)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the journal sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the compaction threshold (in journal entries)
    pub fn compact_threshold(mut self, entries: usize) -> Self {
        self.config.compact_threshold = entries;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

// =============================================================================
// Network Configuration
// =============================================================================

/// A route handed back untouched with every allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub dst: Subnet,

    /// Next hop, if not the default gateway
    pub gw: Option<IpAddr>,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gw {
            Some(gw) => write!(f, "{} via {}", self.dst, gw),
            None => write!(f, "{}", self.dst),
        }
    }
}

impl FromStr for Route {
    type Err = IpamError;

    /// Parse `dst` or `dst,gw`, e.g. `0.0.0.0/0,10.0.0.254`
    fn from_str(s: &str) -> Result<Self> {
        let (dst, gw) = match s.split_once(',') {
            Some((dst, gw)) => {
                let gw = gw
                    .trim()
                    .parse()
                    .map_err(|e| IpamError::Config(format!("bad route gateway in {:?}: {}", s, e)))?;
                (dst, Some(gw))
            }
            None => (s, None),
        };

        Ok(Self {
            dst: dst.trim().parse()?,
            gw,
        })
    }
}

/// The network an allocator hands addresses out of
#[derive(Debug, Clone)]
pub struct IpamConfig {
    /// Network name, used in error messages and as the store directory
    pub name: String,

    /// Subnet to allocate from
    pub subnet: Subnet,

    /// First allocatable address (inclusive)
    pub range_start: Option<IpAddr>,

    /// Last allocatable address (inclusive)
    pub range_end: Option<IpAddr>,

    /// Gateway, never allocated; defaults to the first address after the network address
    pub gateway: Option<IpAddr>,

    /// Address the caller insists on, bypassing the search
    pub requested_ip: Option<IpAddr>,

    /// Routes passed through to the result
    pub routes: Vec<Route>,
}

impl IpamConfig {
    /// Create a new config builder
    pub fn builder() -> IpamConfigBuilder {
        IpamConfigBuilder::default()
    }

    /// Check that the network name is usable as a directory name and that
    /// every optional address sits inside the subnet
    pub fn validate(&self) -> Result<()> {
        validate_network_name(&self.name)?;

        for addr in [self.range_start, self.range_end].into_iter().flatten() {
            crate::net::validate_in_range(addr, &self.subnet)?;
        }

        if let Some(gw) = self.gateway {
            if !self.subnet.contains(gw) {
                return Err(IpamError::Config(format!(
                    "gateway {} not in network {}",
                    gw, self.subnet
                )));
            }
        }

        Ok(())
    }
}

/// Reject network names that cannot serve as a single directory name
pub fn validate_network_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(IpamError::Config(format!("invalid network name {:?}", name)));
    }
    Ok(())
}

/// Builder for IpamConfig
#[derive(Default)]
pub struct IpamConfigBuilder {
    name: Option<String>,
    subnet: Option<Subnet>,
    range_start: Option<IpAddr>,
    range_end: Option<IpAddr>,
    gateway: Option<IpAddr>,
    requested_ip: Option<IpAddr>,
    routes: Vec<Route>,
}

impl IpamConfigBuilder {
    /// Set the network name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the subnet (required)
    pub fn subnet(mut self, subnet: Subnet) -> Self {
        self.subnet = Some(subnet);
        self
    }

    /// Set the inclusive range start
    pub fn range_start(mut self, addr: IpAddr) -> Self {
        self.range_start = Some(addr);
        self
    }

    /// Set the inclusive range end
    pub fn range_end(mut self, addr: IpAddr) -> Self {
        self.range_end = Some(addr);
        self
    }

    /// Set an explicit gateway
    pub fn gateway(mut self, addr: IpAddr) -> Self {
        self.gateway = Some(addr);
        self
    }

    /// Request a specific address
    pub fn requested_ip(mut self, addr: IpAddr) -> Self {
        self.requested_ip = Some(addr);
        self
    }

    /// Append a pass-through route
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Build the config
    ///
    /// Fails with `InvalidSubnet` when no subnet was given. Range and gateway
    /// membership is checked later, by `validate()` or allocator construction.
    pub fn build(self) -> Result<IpamConfig> {
        let subnet = self
            .subnet
            .ok_or_else(|| IpamError::InvalidSubnet("missing field \"subnet\"".to_string()))?;

        Ok(IpamConfig {
            name: self.name.unwrap_or_else(|| "default".to_string()),
            subnet,
            range_start: self.range_start,
            range_end: self.range_end,
            gateway: self.gateway,
            requested_ip: self.requested_ip,
            routes: self.routes,
        })
    }
}
