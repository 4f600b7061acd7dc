//! In-memory reservation store
//!
//! Nothing is persisted. Clones share one table and one lock, and each clone
//! acts as a separate store instance, so contention between "processes" can
//! be exercised with threads.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{IpamError, Result};
use crate::table::ReservationTable;

use super::Store;

#[derive(Default)]
struct Shared {
    /// Whether some instance holds the lock
    held: Mutex<bool>,
    /// Signalled when `held` goes false
    released: Condvar,
    table: Mutex<ReservationTable>,
}

/// Store backed by a shared in-process table
#[derive(Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    /// Whether this instance holds the lock
    holding: bool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All reservations in address order
    pub fn reservations(&self) -> Vec<(IpAddr, String)> {
        self.shared
            .table
            .lock()
            .iter()
            .map(|(addr, owner)| (*addr, owner.to_string()))
            .collect()
    }

    /// Whether this instance currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.holding
    }

    fn ensure_locked(&self, op: &'static str) -> Result<()> {
        if self.holding {
            Ok(())
        } else {
            Err(IpamError::NotLocked(op))
        }
    }
}

impl Clone for MemoryStore {
    /// A new instance over the same table; the lock is not shared with the clone
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            holding: false,
        }
    }
}

impl Store for MemoryStore {
    fn lock(&mut self) -> Result<()> {
        if self.holding {
            return Ok(());
        }

        let mut held = self.shared.held.lock();
        while *held {
            self.shared.released.wait(&mut held);
        }
        *held = true;
        self.holding = true;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.holding {
            return Ok(());
        }

        *self.shared.held.lock() = false;
        self.shared.released.notify_one();
        self.holding = false;
        Ok(())
    }

    fn reserve(&mut self, id: &str, addr: IpAddr) -> Result<bool> {
        self.ensure_locked("reserve")?;
        Ok(self.shared.table.lock().try_reserve(id, addr))
    }

    fn release_by_id(&mut self, id: &str) -> Result<()> {
        self.ensure_locked("release_by_id")?;
        let mut table = self.shared.table.lock();
        for addr in table.addresses_of(id) {
            table.release(&addr);
        }
        Ok(())
    }

    fn last_reserved_ip(&mut self) -> Result<Option<IpAddr>> {
        self.ensure_locked("last_reserved_ip")?;
        Ok(self.shared.table.lock().last_reserved())
    }

    fn close(&mut self) -> Result<()> {
        self.unlock()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // unlock never fails for this store
        let _ = self.unlock();
    }
}
