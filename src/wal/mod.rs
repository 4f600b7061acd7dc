//! Reservation Journal
//!
//! Append-only log of every reservation change, written before the change is
//! considered made.
//!
//! ## Responsibilities
//! - Append one entry per reserve and one per release request
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering against the snapshot
//! - Crash recovery: drop a torn tail, refuse mid-log corruption
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Entry 1                                                  │
//! │ ┌─────────┬─────────┬──────────────┬─────────┬────────┐  │
//! │ │ LSN (8) │ Len (4) │ HeaderCRC (4)│ CRC (4) │ Data   │  │
//! │ └─────────┴─────────┴──────────────┴─────────┴────────┘  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry 2                                                  │
//! │ ...                                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All header integers are little-endian. `Data` is the bincode encoding of
//! the operation and its timestamp. `HeaderCRC` covers LSN and Len, `CRC`
//! covers `Data`. A header is checked before its length is used, so only a
//! file that really ends part-way through an entry reads as a torn tail.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, Frame};
pub use recovery::{WalRecovery, RecoveryResult};
