//! Reservation Store
//!
//! The capability the allocator needs from durable storage, and the RAII
//! guard it uses to hold the store's lock.
//!
//! ## Contract
//! - `lock`/`unlock` exclude every other store instance for the same network,
//!   whether in this process or another one
//! - `reserve`, `release_by_id` and `last_reserved_ip` are only valid while
//!   locked
//! - `close` releases resources, unlocking first if needed; calling it twice
//!   is fine
//!
//! ## Implementations
//! - [`DiskStore`]: journal + snapshot under a per-network directory, locked
//!   with an advisory file lock
//! - [`MemoryStore`]: shared in-process table, locked with a mutex/condvar
//!   pair; clones behave as independent instances

mod disk;
mod memory;

use std::net::IpAddr;
use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::error::Result;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Durable address → owner table with a cross-instance exclusive lock
pub trait Store {
    /// Block until this instance holds the exclusive lock
    fn lock(&mut self) -> Result<()>;

    /// Release the exclusive lock; a no-op if not held
    fn unlock(&mut self) -> Result<()>;

    /// Claim `addr` for `id` if it has no owner
    ///
    /// Returns `Ok(false)` when the address is taken by anyone, `id`
    /// included. Success moves the last-reserved marker to `addr`.
    fn reserve(&mut self, id: &str, addr: IpAddr) -> Result<bool>;

    /// Remove every reservation owned by `id`; unknown owners are not an error
    fn release_by_id(&mut self, id: &str) -> Result<()>;

    /// The most recently reserved address, if any
    fn last_reserved_ip(&mut self) -> Result<Option<IpAddr>>;

    /// Release all resources
    fn close(&mut self) -> Result<()>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn lock(&mut self) -> Result<()> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<()> {
        (**self).unlock()
    }

    fn reserve(&mut self, id: &str, addr: IpAddr) -> Result<bool> {
        (**self).reserve(id, addr)
    }

    fn release_by_id(&mut self, id: &str) -> Result<()> {
        (**self).release_by_id(id)
    }

    fn last_reserved_ip(&mut self) -> Result<Option<IpAddr>> {
        (**self).last_reserved_ip()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn lock(&mut self) -> Result<()> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<()> {
        (**self).unlock()
    }

    fn reserve(&mut self, id: &str, addr: IpAddr) -> Result<bool> {
        (**self).reserve(id, addr)
    }

    fn release_by_id(&mut self, id: &str) -> Result<()> {
        (**self).release_by_id(id)
    }

    fn last_reserved_ip(&mut self) -> Result<Option<IpAddr>> {
        (**self).last_reserved_ip()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Holds a store's lock for as long as it lives
///
/// Dropping the guard unlocks, so early returns and `?` never leak the lock.
/// `release` unlocks explicitly and reports failures that `Drop` could only log.
pub struct StoreGuard<'a, S: Store + ?Sized> {
    store: &'a mut S,
    held: bool,
}

impl<'a, S: Store + ?Sized> StoreGuard<'a, S> {
    /// Lock `store` and wrap it
    pub fn acquire(store: &'a mut S) -> Result<Self> {
        store.lock()?;
        Ok(Self { store, held: true })
    }

    /// Unlock now, surfacing any error
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.store.unlock()
    }
}

impl<S: Store + ?Sized> Deref for StoreGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.store
    }
}

impl<S: Store + ?Sized> DerefMut for StoreGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.store
    }
}

impl<S: Store + ?Sized> Drop for StoreGuard<'_, S> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.store.unlock() {
                warn!(error = %e, "failed to release store lock");
            }
        }
    }
}
