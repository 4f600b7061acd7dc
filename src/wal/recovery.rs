//! Journal Recovery
//!
//! Handles crash recovery by reading back the journal.
//!
//! A process that dies mid-append leaves at most one damaged entry, and it is
//! always the last one in the file. That tail is cut off. Damage anywhere
//! else means the medium itself is bad, and recovery refuses to guess.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::warn;

use crate::error::{IpamError, Result};

use super::{Frame, WalEntry, WalReader};

/// Handles journal recovery after a crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of damaged entries dropped from the tail (0 or 1)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 if none)
    pub last_lsn: u64,

    /// Whether the file was (or, for `verify`, would be) truncated
    pub was_truncated: bool,

    /// Length of the valid prefix of the file
    pub valid_len: u64,
}

impl WalRecovery {
    /// Recover entries from a journal file
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Truncate a torn or checksum-failing tail entry
    /// 3. Fail with `StoreCorruption` if a damaged entry is followed by more data
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result) = Self::scan(path)?;

        if result.was_truncated {
            warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                last_lsn = result.last_lsn,
                "truncating damaged journal tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a journal file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, result)| result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let file_len = reader.file_len();

        let mut entries = Vec::new();
        let mut last_lsn = 0;
        let mut entries_corrupted = 0;
        let mut valid_len = 0;

        while let Some(frame) = reader.next_frame()? {
            match frame {
                Frame::Entry(entry) => {
                    if entry.lsn <= last_lsn {
                        return Err(IpamError::StoreCorruption(format!(
                            "journal LSN went backwards: {} after {}",
                            entry.lsn, last_lsn
                        )));
                    }
                    last_lsn = entry.lsn;
                    valid_len = reader.position();
                    entries.push(entry);
                }
                Frame::Torn { .. } => {
                    entries_corrupted = 1;
                    break;
                }
                Frame::BadChecksum { offset, end } => {
                    if end < file_len {
                        return Err(IpamError::StoreCorruption(format!(
                            "journal {} damaged at offset {} with {} bytes following",
                            path.display(),
                            offset,
                            file_len - end
                        )));
                    }
                    entries_corrupted = 1;
                    break;
                }
            }
        }

        let result = RecoveryResult {
            entries_recovered: entries.len() as u64,
            entries_corrupted,
            last_lsn,
            was_truncated: valid_len < file_len,
            valid_len,
        };

        Ok((entries, result))
    }
}
