//! Snapshot encoding, atomic replacement, and loading

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::net::IpAddr;
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{IpamError, Result};
use crate::net::{from_octets, octets};
use crate::table::ReservationTable;

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// A loaded checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Reservations and marker as of `last_lsn`
    pub table: ReservationTable,

    /// Highest journal LSN folded into this snapshot
    pub last_lsn: u64,
}

impl Snapshot {
    /// Atomically write `table` as the snapshot at `path`
    ///
    /// Writes `{path}.tmp`, fsyncs it, renames it over `path`, then fsyncs
    /// the parent directory. Returns the snapshot size in bytes.
    pub fn write(path: &Path, table: &ReservationTable, last_lsn: u64) -> Result<u64> {
        let bytes = encode(table, last_lsn);
        let tmp_path = path.with_extension("snap.tmp");

        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;
        if let Some(dir) = path.parent() {
            File::open(dir)?.sync_all()?;
        }

        Ok(bytes.len() as u64)
    }

    /// Load the snapshot at `path`, or `None` if there is none yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode(&bytes).map(Some)
    }
}

fn encode(table: &ReservationTable, last_lsn: u64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + FOOTER_SIZE + table.len() * 48);

    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u64_le(table.len() as u64);
    buf.put_u64_le(last_lsn);

    for (addr, owner) in table.iter() {
        put_addr(&mut buf, Some(addr));
        buf.put_u32_le(owner.len() as u32);
        buf.put_slice(owner.as_bytes());
    }
    put_addr(&mut buf, table.last_reserved().as_ref());

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    buf
}

fn put_addr(buf: &mut BytesMut, addr: Option<&IpAddr>) {
    match addr {
        Some(addr) => {
            let bytes = octets(addr);
            buf.put_u8(bytes.len() as u8);
            buf.put_slice(&bytes);
        }
        None => buf.put_u8(0),
    }
}

fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupt(format!("snapshot too short: {} bytes", bytes.len())));
    }

    let (body, mut footer) = bytes.split_at(bytes.len() - FOOTER_SIZE);
    let stored_crc = footer.get_u32_le();
    let actual_crc = crc32fast::hash(body);
    if stored_crc != actual_crc {
        return Err(corrupt(format!(
            "snapshot checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, actual_crc
        )));
    }

    let mut buf = body;
    if &buf[..4] != MAGIC {
        return Err(corrupt(format!("invalid snapshot magic: {:?}", &buf[..4])));
    }
    buf.advance(4);

    let version = buf.get_u16_le();
    if version != VERSION {
        return Err(corrupt(format!("unsupported snapshot version: {}", version)));
    }

    let count = buf.get_u64_le();
    let last_lsn = buf.get_u64_le();

    let mut table = ReservationTable::new();
    for _ in 0..count {
        let addr = get_addr(&mut buf)?
            .ok_or_else(|| corrupt("snapshot record without an address".to_string()))?;

        need(&buf, 4)?;
        let owner_len = buf.get_u32_le() as usize;
        need(&buf, owner_len)?;
        let owner = String::from_utf8(buf[..owner_len].to_vec())
            .map_err(|e| corrupt(format!("snapshot owner is not UTF-8: {}", e)))?;
        buf.advance(owner_len);

        if !table.try_reserve(&owner, addr) {
            return Err(corrupt(format!("duplicate snapshot record for {}", addr)));
        }
    }

    let marker = get_addr(&mut buf)?;
    table.set_last_reserved(marker);

    if buf.has_remaining() {
        return Err(corrupt(format!("{} trailing bytes in snapshot", buf.remaining())));
    }

    Ok(Snapshot { table, last_lsn })
}

fn get_addr(buf: &mut &[u8]) -> Result<Option<IpAddr>> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(None);
    }

    need(buf, len)?;
    let addr = from_octets(&buf[..len])
        .ok_or_else(|| corrupt(format!("snapshot address of invalid width {}", len)))?;
    buf.advance(len);
    Ok(Some(addr))
}

fn need(buf: &&[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(corrupt(format!(
            "snapshot truncated: need {} bytes, {} left",
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

fn corrupt(msg: String) -> IpamError {
    IpamError::StoreCorruption(msg)
}
