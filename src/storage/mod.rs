//! Storage Module
//!
//! Compacted checkpoint of a network's reservation table.
//!
//! ## Responsibilities
//! - Persist the whole table plus marker in one file
//! - Replace it atomically (temp file, fsync, rename)
//! - Record the journal LSN the checkpoint covers, so replay can skip
//!   entries already folded in
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                          │
//! │   Magic: "HLIP" (4) | Version: u16 (2) | Count: u64 (8)    │
//! │   LastLsn: u64 (8)                                         │
//! ├────────────────────────────────────────────────────────────┤
//! │ Records (variable), address order                          │
//! │   [AddrLen: u8][Addr][OwnerLen: u32][Owner]                │
//! ├────────────────────────────────────────────────────────────┤
//! │ Marker                                                     │
//! │   [AddrLen: u8][Addr]   (AddrLen = 0 means no marker)      │
//! ├────────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                           │
//! │   CRC32 of everything above                                │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod snapshot;

pub use snapshot::Snapshot;

/// Magic bytes identifying a reservation snapshot
pub(crate) const MAGIC: &[u8; 4] = b"HLIP";

/// Current snapshot format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Count (8) + LastLsn (8)
pub(crate) const HEADER_SIZE: usize = 22;

/// Footer size: CRC32 (4)
pub(crate) const FOOTER_SIZE: usize = 4;
