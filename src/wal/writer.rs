//! Journal Writer
//!
//! Handles appending entries to the journal file.
//!
//! ## Commit Point
//! An entry counts once it has been fsynced. Whenever a write or an fsync
//! fails, the file is cut back to the length it had at the last successful
//! sync, so a failed request leaves nothing behind for replay.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::SyncStrategy;
use crate::error::Result;

use super::{Operation, WalEntry};

/// File state as of the last successful sync
#[derive(Debug, Clone, Copy)]
struct Mark {
    len: u64,
    lsn: u64,
    entry_count: usize,
}

/// Appends entries to the journal file
pub struct WalWriter {
    /// Journal path (for diagnostics)
    path: PathBuf,
    /// Open in append mode
    file: File,
    /// Bytes written, synced or not
    len: u64,
    /// LSN of the most recent entry written (or inherited from recovery)
    current_lsn: u64,
    /// Entries currently in the file
    entry_count: usize,
    /// When to fsync
    sync_strategy: SyncStrategy,
    /// Appends since the last fsync
    unsynced: usize,
    /// Where a failed write or sync rolls back to
    committed: Mark,
}

impl WalWriter {
    /// Open or create a journal file
    ///
    /// `last_lsn` is the highest LSN already accounted for (by recovery or a
    /// snapshot); new entries continue after it. `entry_count` is the number
    /// of valid entries already in the file.
    pub fn open(
        path: &Path,
        sync_strategy: SyncStrategy,
        last_lsn: u64,
        entry_count: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            current_lsn: last_lsn,
            entry_count,
            sync_strategy,
            unsynced: 0,
            committed: Mark {
                len,
                lsn: last_lsn,
                entry_count,
            },
        })
    }

    /// Append an operation, returning the LSN it was assigned
    ///
    /// The whole framed entry goes out in one write so a crash leaves at
    /// most one torn entry at the tail. On failure the journal is rolled
    /// back to the last sync and the error returned.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.file.write_all(&bytes) {
            self.rollback();
            return Err(e.into());
        }
        self.len += bytes.len() as u64;
        self.current_lsn = lsn;
        self.entry_count += 1;
        self.unsynced += 1;

        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    ///
    /// A failed sync rolls the journal back to the previous sync, dropping
    /// every entry appended since.
    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced == 0 {
            return Ok(());
        }

        if let Err(e) = self.file.sync_data() {
            self.rollback();
            return Err(e.into());
        }

        self.unsynced = 0;
        self.committed = Mark {
            len: self.len,
            lsn: self.current_lsn,
            entry_count: self.entry_count,
        };
        Ok(())
    }

    /// Drop every entry (after they were folded into a snapshot)
    ///
    /// The LSN keeps counting so later entries still sort after the snapshot.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.entry_count = 0;
        self.unsynced = 0;
        self.committed = Mark {
            len: 0,
            lsn: self.current_lsn,
            entry_count: 0,
        };
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Number of entries in the file
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Bytes written to the journal, synced or not
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the journal holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut the file back to the last committed mark
    ///
    /// A failed cut is only logged: the caller is already returning the
    /// original error, and recovery drops a torn tail on the next load.
    fn rollback(&mut self) {
        let mark = self.committed;
        let cut = self
            .file
            .set_len(mark.len)
            .and_then(|()| self.file.sync_all());

        if let Err(e) = cut {
            warn!(
                path = %self.path.display(),
                len = mark.len,
                error = %e,
                "failed to roll back journal"
            );
        }

        self.len = mark.len;
        self.current_lsn = mark.lsn;
        self.entry_count = mark.entry_count;
        self.unsynced = 0;
    }
}
