//! Journal entry definitions
//!
//! Defines the structure of individual journal entries and their framing.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{IpamError, Result};

/// Header size: LSN (8) + Len (4) + HeaderCRC (4) + CRC (4)
pub const HEADER_SIZE: usize = 20;

/// Bytes of the header covered by the header checksum: LSN + Len
const HEADER_CHECKED: usize = 12;

/// Largest payload accepted when decoding (1 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// A single entry in the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The reservation change
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Changes that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// `addr` is now owned by `owner`; also moves the last-reserved marker
    Reserve { addr: IpAddr, owner: String },

    /// Every address in `addrs` held by `owner` is free again
    ///
    /// One entry per release request, so a torn write loses the whole
    /// request rather than part of it.
    Release { owner: String, addrs: Vec<IpAddr> },
}

/// Payload body as written to disk (the LSN lives in the header)
#[derive(Serialize, Deserialize)]
struct Body {
    operation: Operation,
    timestamp: u64,
}

/// Decoded fixed-size header of an entry
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryHeader {
    pub lsn: u64,
    pub len: u32,
    pub crc: u32,
}

impl EntryHeader {
    /// Decode and check a header
    ///
    /// Fails with `StoreCorruption` when the header checksum does not match
    /// or the length is larger than any entry the writer produces, so a
    /// damaged length is never trusted.
    pub(crate) fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut lsn = [0u8; 8];
        let mut len = [0u8; 4];
        let mut header_crc = [0u8; 4];
        let mut crc = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        len.copy_from_slice(&bytes[8..12]);
        header_crc.copy_from_slice(&bytes[12..16]);
        crc.copy_from_slice(&bytes[16..20]);

        let stored = u32::from_le_bytes(header_crc);
        let actual = crc32fast::hash(&bytes[..HEADER_CHECKED]);
        if stored != actual {
            return Err(IpamError::StoreCorruption(format!(
                "journal header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, actual
            )));
        }

        let header = Self {
            lsn: u64::from_le_bytes(lsn),
            len: u32::from_le_bytes(len),
            crc: u32::from_le_bytes(crc),
        };
        if header.len > MAX_PAYLOAD_SIZE {
            return Err(IpamError::StoreCorruption(format!(
                "journal entry at lsn {} claims {} bytes (max {})",
                header.lsn, header.len, MAX_PAYLOAD_SIZE
            )));
        }
        Ok(header)
    }
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Serialize to the on-disk framing: header followed by payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&Body {
            operation: self.operation.clone(),
            timestamp: self.timestamp,
        })?;

        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(IpamError::Serialization(format!(
                "journal payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        let header_crc = crc32fast::hash(&bytes[..HEADER_CHECKED]);
        bytes.extend_from_slice(&header_crc.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    /// Deserialize one complete entry, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let header: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| {
                IpamError::StoreCorruption(format!(
                    "incomplete journal header: expected {} bytes, got {}",
                    HEADER_SIZE,
                    bytes.len()
                ))
            })?;
        let header = EntryHeader::decode(header)?;

        let payload = bytes
            .get(HEADER_SIZE..HEADER_SIZE + header.len as usize)
            .ok_or_else(|| {
                IpamError::StoreCorruption(format!(
                    "incomplete journal payload: expected {} bytes, got {}",
                    header.len,
                    bytes.len() - HEADER_SIZE
                ))
            })?;

        Self::from_parts(header, payload)
    }

    /// Rebuild an entry from a decoded header and its payload
    pub(crate) fn from_parts(header: EntryHeader, payload: &[u8]) -> Result<Self> {
        let actual = crc32fast::hash(payload);
        if actual != header.crc {
            return Err(IpamError::StoreCorruption(format!(
                "journal checksum mismatch at lsn {}: stored {:#010x}, computed {:#010x}",
                header.lsn, header.crc, actual
            )));
        }

        let body: Body = bincode::deserialize(payload)?;
        Ok(Self {
            lsn: header.lsn,
            operation: body.operation,
            timestamp: body.timestamp,
        })
    }
}
