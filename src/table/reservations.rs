//! ReservationTable implementation

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;

use crate::wal::Operation;

/// Address ↔ owner associations plus the last-reserved marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationTable {
    by_addr: BTreeMap<IpAddr, String>,
    by_owner: HashMap<String, BTreeSet<IpAddr>>,
    last_reserved: Option<IpAddr>,
}

impl ReservationTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner of `addr`, if reserved
    pub fn owner_of(&self, addr: &IpAddr) -> Option<&str> {
        self.by_addr.get(addr).map(String::as_str)
    }

    /// Addresses held by `owner`, in address order
    pub fn addresses_of(&self, owner: &str) -> Vec<IpAddr> {
        self.by_owner
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Claim `addr` for `owner` if nobody holds it
    ///
    /// Returns `false` when the address is already owned, even by `owner`
    /// itself. On success the last-reserved marker moves to `addr`.
    pub fn try_reserve(&mut self, owner: &str, addr: IpAddr) -> bool {
        if self.by_addr.contains_key(&addr) {
            return false;
        }
        self.insert(owner.to_string(), addr);
        true
    }

    /// Free `addr`, returning its previous owner
    pub fn release(&mut self, addr: &IpAddr) -> Option<String> {
        let owner = self.by_addr.remove(addr)?;
        if let Some(set) = self.by_owner.get_mut(&owner) {
            set.remove(addr);
            if set.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
        Some(owner)
    }

    /// Apply a journal operation unconditionally (used during replay)
    pub fn apply(&mut self, operation: &Operation) {
        match operation {
            Operation::Reserve { addr, owner } => {
                self.release(addr);
                self.insert(owner.clone(), *addr);
            }
            Operation::Release { owner, addrs } => {
                for addr in addrs {
                    if self.owner_of(addr) == Some(owner.as_str()) {
                        self.release(addr);
                    }
                }
            }
        }
    }

    /// The last-reserved marker
    pub fn last_reserved(&self) -> Option<IpAddr> {
        self.last_reserved
    }

    /// Overwrite the last-reserved marker (used when loading a snapshot)
    pub fn set_last_reserved(&mut self, addr: Option<IpAddr>) {
        self.last_reserved = addr;
    }

    /// Number of reserved addresses
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    /// Whether no address is reserved
    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    /// All reservations in address order
    pub fn iter(&self) -> impl Iterator<Item = (&IpAddr, &str)> {
        self.by_addr.iter().map(|(addr, owner)| (addr, owner.as_str()))
    }

    /// Drop everything, including the marker
    pub fn clear(&mut self) {
        self.by_addr.clear();
        self.by_owner.clear();
        self.last_reserved = None;
    }

    fn insert(&mut self, owner: String, addr: IpAddr) {
        self.by_owner.entry(owner.clone()).or_default().insert(addr);
        self.by_addr.insert(addr, owner);
        self.last_reserved = Some(addr);
    }
}
