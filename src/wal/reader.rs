//! Journal Reader
//!
//! Handles reading entries from the journal file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{IpamError, Result};

use super::entry::EntryHeader;
use super::{WalEntry, HEADER_SIZE};

/// One framed region of the journal
#[derive(Debug)]
pub enum Frame {
    /// A complete entry with a valid checksum
    Entry(WalEntry),

    /// The file ends part-way through the entry starting at `offset`, or
    /// only zero bytes follow it
    Torn { offset: u64 },

    /// A complete entry whose checksum does not match; it spans `offset..end`
    BadChecksum { offset: u64, end: u64 },
}

/// Reads entries from the journal file, front to back
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last frame read
    position: u64,
    /// File length when opened
    file_len: u64,
}

impl WalReader {
    /// Open a journal file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next frame, or `None` at a clean end of file
    ///
    /// After a `Torn` or `BadChecksum` frame the reader position is
    /// unspecified; callers stop there.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let offset = self.position;
        if offset >= self.file_len {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_SIZE];
        if !self.read_full(&mut raw)? {
            return Ok(Some(Frame::Torn { offset }));
        }
        let header = match EntryHeader::decode(&raw) {
            Ok(header) => header,
            // a crash while the file grew can leave zeroes instead of data
            Err(_) if raw.iter().all(|b| *b == 0) && self.rest_is_zero()? => {
                return Ok(Some(Frame::Torn { offset }));
            }
            Err(e) => {
                return Err(IpamError::StoreCorruption(format!(
                    "damaged journal header at offset {}: {}",
                    offset, e
                )));
            }
        };

        let end = offset + HEADER_SIZE as u64 + header.len as u64;
        if end > self.file_len {
            return Ok(Some(Frame::Torn { offset }));
        }

        let mut payload = vec![0u8; header.len as usize];
        if !self.read_full(&mut payload)? {
            return Ok(Some(Frame::Torn { offset }));
        }
        self.position = end;

        match WalEntry::from_parts(header, &payload) {
            Ok(entry) => Ok(Some(Frame::Entry(entry))),
            Err(IpamError::StoreCorruption(_)) => Ok(Some(Frame::BadChecksum { offset, end })),
            Err(e) => Err(e),
        }
    }

    /// Read the next entry, treating any damaged frame as an error
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.next_frame()? {
            None => Ok(None),
            Some(Frame::Entry(entry)) => Ok(Some(entry)),
            Some(Frame::Torn { offset }) => Err(IpamError::StoreCorruption(format!(
                "partial journal entry at offset {}",
                offset
            ))),
            Some(Frame::BadChecksum { offset, .. }) => Err(IpamError::StoreCorruption(format!(
                "journal checksum mismatch at offset {}",
                offset
            ))),
        }
    }

    /// Offset just past the last frame read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length of the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Iterate over all entries, stopping at the first damaged frame
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Whether everything after the current read position is zero bytes
    fn rest_is_zero(&mut self) -> Result<bool> {
        let mut buf = [0u8; 4096];
        loop {
            let n = self.reader.read(&mut buf)?;
            if n == 0 {
                return Ok(true);
            }
            if buf[..n].iter().any(|b| *b != 0) {
                return Ok(false);
            }
        }
    }

    /// `read_exact` that reports a short read as `false` instead of an error
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Iterator over journal entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.reader.next_entry().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
