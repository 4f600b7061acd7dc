//! Disk-backed reservation store
//!
//! One directory per network. The table is rebuilt from the snapshot and
//! journal every time the lock is taken and dropped when it is released:
//! another process may change the files in between.

use std::fs::{self, File, OpenOptions};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::config::{validate_network_name, StoreConfig};
use crate::error::{IpamError, Result};
use crate::storage::Snapshot;
use crate::table::ReservationTable;
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::Store;

/// State that only exists while the lock is held
struct Locked {
    table: ReservationTable,
    wal: WalWriter,
}

/// Reservation store persisted under `{data_dir}/{network}/`
///
/// ## Locking
/// Each instance opens its own handle on the `lock` file and takes an
/// exclusive advisory lock on it, so two instances exclude each other whether
/// they live in one process or in two. The kernel drops the lock if the
/// holder dies.
pub struct DiskStore {
    /// Per-network directory
    dir: PathBuf,

    /// Store configuration
    config: StoreConfig,

    /// Handle the advisory lock is taken on; `None` once closed
    lock_file: Option<File>,

    /// Loaded table and open journal; `Some` exactly while locked
    locked: Option<Locked>,
}

impl DiskStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const LOCK_FILENAME: &'static str = "lock";
    const WAL_FILENAME: &'static str = "reservations.wal";
    const SNAPSHOT_FILENAME: &'static str = "reservations.snap";

    /// Open (creating if needed) the store for `network`
    ///
    /// Performs no locking and reads no reservations.
    pub fn open(config: StoreConfig, network: &str) -> Result<Self> {
        validate_network_name(network)?;
        let dir = config.data_dir.join(network);
        fs::create_dir_all(&dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join(Self::LOCK_FILENAME))?;

        debug!(dir = %dir.display(), "opened reservation store");

        Ok(Self {
            dir,
            config,
            lock_file: Some(lock_file),
            locked: None,
        })
    }

    /// Open with a data directory (convenience method)
    ///
    /// Uses the default config with the specified data directory
    pub fn open_path(data_dir: &Path, network: &str) -> Result<Self> {
        let config = StoreConfig::builder().data_dir(data_dir).build();
        Self::open(config, network)
    }

    /// All reservations in address order (lock required)
    pub fn reservations(&self) -> Result<Vec<(IpAddr, String)>> {
        let locked = self
            .locked
            .as_ref()
            .ok_or(IpamError::NotLocked("reservations"))?;

        Ok(locked
            .table
            .iter()
            .map(|(addr, owner)| (*addr, owner.to_string()))
            .collect())
    }

    /// Whether this instance currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Journal entries not yet folded into the snapshot (lock required)
    pub fn journal_len(&self) -> Result<usize> {
        self.locked
            .as_ref()
            .map(|locked| locked.wal.entry_count())
            .ok_or(IpamError::NotLocked("journal_len"))
    }

    /// Per-network directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn wal_path(&self) -> PathBuf {
        self.dir.join(Self::WAL_FILENAME)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(Self::SNAPSHOT_FILENAME)
    }

    fn locked_mut(&mut self, op: &'static str) -> Result<&mut Locked> {
        self.locked.as_mut().ok_or(IpamError::NotLocked(op))
    }

    /// Rebuild the table from disk
    ///
    /// 1. Load the snapshot, if any
    /// 2. Recover the journal (cutting a torn tail)
    /// 3. Replay journal entries newer than the snapshot
    /// 4. Reopen the journal for appending
    fn load(&self) -> Result<Locked> {
        let snapshot = Snapshot::load(&self.snapshot_path())?.unwrap_or_default();
        let mut table = snapshot.table;
        let mut last_lsn = snapshot.last_lsn;

        let wal_path = self.wal_path();
        let mut entry_count = 0;

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_corrupted > 0 {
                warn!(
                    dir = %self.dir.display(),
                    recovered = recovery.entries_recovered,
                    "dropped torn journal entry left by an interrupted writer"
                );
            }

            let mut replayed = 0;
            for entry in &entries {
                if entry.lsn > snapshot.last_lsn {
                    table.apply(&entry.operation);
                    replayed += 1;
                }
            }

            debug!(
                dir = %self.dir.display(),
                snapshot_lsn = snapshot.last_lsn,
                journal_entries = entries.len(),
                replayed,
                "replayed reservation journal"
            );

            last_lsn = last_lsn.max(recovery.last_lsn);
            entry_count = entries.len();
        }

        let wal = WalWriter::open(&wal_path, self.config.sync_strategy, last_lsn, entry_count)?;
        Ok(Locked { table, wal })
    }

    /// Persist everything before the lock goes away
    ///
    /// The journal sync is the commit point. Compaction runs after it and a
    /// failure there is only logged, since the journal already holds every
    /// change.
    fn persist(&self, mut locked: Locked) -> Result<()> {
        locked.wal.sync()?;

        if locked.wal.entry_count() >= self.config.compact_threshold {
            if let Err(e) = self.compact(&mut locked) {
                warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "journal compaction failed, keeping journal"
                );
            }
        }
        Ok(())
    }

    /// Fold the journal into a fresh snapshot and empty it
    fn compact(&self, locked: &mut Locked) -> Result<()> {
        let lsn = locked.wal.current_lsn();
        let size = Snapshot::write(&self.snapshot_path(), &locked.table, lsn)?;
        locked.wal.truncate()?;

        debug!(
            dir = %self.dir.display(),
            lsn,
            reservations = locked.table.len(),
            bytes = size,
            "compacted reservation journal"
        );
        Ok(())
    }

    /// Rebuild the table from disk after a failed journal write
    ///
    /// The writer has rolled the journal back to its last sync, which may
    /// drop earlier changes made under this lock; the table must follow.
    fn reload(&mut self) {
        match self.load() {
            Ok(locked) => self.locked = Some(locked),
            Err(e) => warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to reload reservations after journal error"
            ),
        }
    }
}

impl Store for DiskStore {
    fn lock(&mut self) -> Result<()> {
        if self.locked.is_some() {
            return Ok(());
        }

        let file = self.lock_file.as_ref().ok_or(IpamError::Closed)?;
        FileExt::lock_exclusive(file)?;
        debug!(dir = %self.dir.display(), "acquired store lock");

        match self.load() {
            Ok(locked) => {
                self.locked = Some(locked);
                Ok(())
            }
            Err(e) => {
                FileExt::unlock(file)?;
                Err(e)
            }
        }
    }

    fn unlock(&mut self) -> Result<()> {
        let Some(locked) = self.locked.take() else {
            return Ok(());
        };

        let persisted = self.persist(locked);

        let unlocked = match self.lock_file.as_ref() {
            Some(file) => FileExt::unlock(file),
            None => Ok(()),
        };
        if let Err(e) = unlocked {
            // closing the handle drops the advisory lock
            warn!(dir = %self.dir.display(), error = %e, "failed to release store lock, closing");
            self.lock_file = None;
        }
        debug!(dir = %self.dir.display(), "released store lock");

        persisted
    }

    fn reserve(&mut self, id: &str, addr: IpAddr) -> Result<bool> {
        let locked = self.locked_mut("reserve")?;

        if locked.table.owner_of(&addr).is_some() {
            return Ok(false);
        }

        // journal first: a failed append leaves the table untouched
        let appended = locked.wal.append(Operation::Reserve {
            addr,
            owner: id.to_string(),
        });
        match appended {
            Ok(_) => {
                locked.table.try_reserve(id, addr);
                Ok(true)
            }
            Err(e) => {
                self.reload();
                Err(e)
            }
        }
    }

    fn release_by_id(&mut self, id: &str) -> Result<()> {
        let locked = self.locked_mut("release_by_id")?;

        let addrs = locked.table.addresses_of(id);
        if addrs.is_empty() {
            return Ok(());
        }

        // one entry for the whole owner: replay sees all of it or none
        let appended = locked.wal.append(Operation::Release {
            owner: id.to_string(),
            addrs: addrs.clone(),
        });
        if let Err(e) = appended {
            self.reload();
            return Err(e);
        }

        for addr in addrs {
            locked.table.release(&addr);
            info!(%addr, owner = id, "released address");
        }
        Ok(())
    }

    fn last_reserved_ip(&mut self) -> Result<Option<IpAddr>> {
        Ok(self.locked_mut("last_reserved_ip")?.table.last_reserved())
    }

    fn close(&mut self) -> Result<()> {
        let unlocked = self.unlock();
        self.lock_file = None;
        unlocked
    }
}

impl Drop for DiskStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(dir = %self.dir.display(), error = %e, "failed to close reservation store");
        }
    }
}
