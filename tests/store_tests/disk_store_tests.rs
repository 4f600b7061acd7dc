//! Tests for the disk-backed reservation store
//!
//! These tests verify:
//! - Operations require the lock
//! - Reservations and the marker survive close/reopen
//! - Compaction into a snapshot, and replay on top of it
//! - Torn journal tails are dropped on the next lock; other damage fails it
//! - Failed compaction or appends never leave a half-made change
//! - Releasing an owner is a single journal entry
//! - Two instances exclude each other
//! - Close is idempotent and final

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use hostlocal::config::{StoreConfig, SyncStrategy};
use hostlocal::store::{DiskStore, Store};
use hostlocal::IpamError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn ip(n: u8) -> IpAddr {
    IpAddr::from([10, 0, 0, n])
}

fn config(temp: &TempDir) -> StoreConfig {
    StoreConfig::builder().data_dir(temp.path()).build()
}

fn open(temp: &TempDir) -> DiskStore {
    DiskStore::open(config(temp), "net1").unwrap()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_open_creates_network_directory() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    assert_eq!(store.dir(), temp.path().join("net1"));
    assert!(store.dir().join("lock").exists());
    assert!(!store.is_locked());
}

#[test]
fn test_open_rejects_bad_network_name() {
    let temp = TempDir::new().unwrap();

    for name in ["", "..", "a/b"] {
        assert!(matches!(
            DiskStore::open(config(&temp), name),
            Err(IpamError::Config(_))
        ));
    }
}

#[test]
fn test_operations_require_lock() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);

    assert!(matches!(store.reserve("a", ip(2)), Err(IpamError::NotLocked(_))));
    assert!(matches!(store.release_by_id("a"), Err(IpamError::NotLocked(_))));
    assert!(matches!(store.last_reserved_ip(), Err(IpamError::NotLocked(_))));
    assert!(matches!(store.reservations(), Err(IpamError::NotLocked(_))));
}

#[test]
fn test_reserve_and_release() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);
    store.lock().unwrap();

    assert!(store.reserve("a", ip(2)).unwrap());
    assert!(store.reserve("a", ip(3)).unwrap());
    assert!(store.reserve("b", ip(4)).unwrap());
    assert!(!store.reserve("b", ip(2)).unwrap());
    assert_eq!(store.last_reserved_ip().unwrap(), Some(ip(4)));

    store.release_by_id("a").unwrap();
    store.release_by_id("unknown").unwrap();

    assert_eq!(store.reservations().unwrap(), vec![(ip(4), "b".to_string())]);
    assert_eq!(store.last_reserved_ip().unwrap(), Some(ip(4)));
    store.unlock().unwrap();
}

#[test]
fn test_lock_and_unlock_are_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);

    store.unlock().unwrap();
    store.lock().unwrap();
    store.lock().unwrap();
    assert!(store.is_locked());

    store.unlock().unwrap();
    store.unlock().unwrap();
    assert!(!store.is_locked());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reservations_survive_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let mut store = open(&temp);
        store.lock().unwrap();
        store.reserve("a", ip(2)).unwrap();
        store.reserve("b", ip(9)).unwrap();
        store.reserve("c", ip(5)).unwrap();
        store.release_by_id("b").unwrap();
        store.close().unwrap();
    }

    let mut store = open(&temp);
    store.lock().unwrap();

    assert_eq!(
        store.reservations().unwrap(),
        vec![(ip(2), "a".to_string()), (ip(5), "c".to_string())]
    );
    assert_eq!(store.last_reserved_ip().unwrap(), Some(ip(5)));
}

#[test]
fn test_changes_from_another_instance_visible_on_next_lock() {
    let temp = TempDir::new().unwrap();
    let mut first = open(&temp);
    let mut second = open(&temp);

    first.lock().unwrap();
    first.reserve("a", ip(2)).unwrap();
    first.unlock().unwrap();

    second.lock().unwrap();
    assert!(!second.reserve("b", ip(2)).unwrap());
    assert!(second.reserve("b", ip(3)).unwrap());
    second.unlock().unwrap();

    first.lock().unwrap();
    assert_eq!(first.last_reserved_ip().unwrap(), Some(ip(3)));
    assert_eq!(first.reservations().unwrap().len(), 2);
}

#[test]
fn test_sync_on_unlock_persists() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .data_dir(temp.path())
        .sync_strategy(SyncStrategy::OnUnlock)
        .build();

    {
        let mut store = DiskStore::open(config.clone(), "net1").unwrap();
        store.lock().unwrap();
        store.reserve("a", ip(2)).unwrap();
        store.unlock().unwrap();
    }

    let mut store = DiskStore::open(config, "net1").unwrap();
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap(), vec![(ip(2), "a".to_string())]);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compaction_writes_snapshot_and_truncates_journal() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .data_dir(temp.path())
        .compact_threshold(4)
        .build();

    let mut store = DiskStore::open(config.clone(), "net1").unwrap();
    store.lock().unwrap();
    for n in 2..8 {
        store.reserve(&format!("c{}", n), ip(n)).unwrap();
    }
    store.release_by_id("c3").unwrap();
    assert_eq!(store.journal_len().unwrap(), 7);
    store.unlock().unwrap();

    let dir = temp.path().join("net1");
    assert!(dir.join("reservations.snap").exists());
    assert_eq!(fs::metadata(dir.join("reservations.wal")).unwrap().len(), 0);

    // new changes land in the journal on top of the snapshot
    store.lock().unwrap();
    assert_eq!(store.journal_len().unwrap(), 0);
    store.reserve("c3", ip(3)).unwrap();
    store.unlock().unwrap();
    drop(store);

    let mut store = DiskStore::open(config, "net1").unwrap();
    store.lock().unwrap();
    let reservations = store.reservations().unwrap();
    assert_eq!(reservations.len(), 6);
    assert!(reservations.contains(&(ip(3), "c3".to_string())));
    assert_eq!(store.last_reserved_ip().unwrap(), Some(ip(3)));
}

#[test]
fn test_below_threshold_keeps_journal() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);

    store.lock().unwrap();
    store.reserve("a", ip(2)).unwrap();
    store.unlock().unwrap();

    let dir = temp.path().join("net1");
    assert!(!dir.join("reservations.snap").exists());
    assert!(fs::metadata(dir.join("reservations.wal")).unwrap().len() > 0);
}

#[test]
fn test_failed_compaction_keeps_committed_reservation() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .data_dir(temp.path())
        .compact_threshold(1)
        .build();
    let mut store = DiskStore::open(config.clone(), "net1").unwrap();

    // the snapshot's temporary file cannot be created
    let dir = temp.path().join("net1");
    fs::create_dir(dir.join("reservations.snap.tmp")).unwrap();

    store.lock().unwrap();
    assert!(store.reserve("a", ip(2)).unwrap());
    store.unlock().unwrap();
    drop(store);

    assert!(!dir.join("reservations.snap").exists());

    let mut store = DiskStore::open(config, "net1").unwrap();
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap(), vec![(ip(2), "a".to_string())]);
    assert_eq!(store.journal_len().unwrap(), 1);
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_release_of_several_addresses_is_one_entry() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);
    store.lock().unwrap();
    store.reserve("a", ip(2)).unwrap();
    store.reserve("a", ip(3)).unwrap();
    store.reserve("b", ip(4)).unwrap();
    assert_eq!(store.journal_len().unwrap(), 3);

    store.release_by_id("a").unwrap();

    assert_eq!(store.journal_len().unwrap(), 4);
    assert_eq!(store.reservations().unwrap(), vec![(ip(4), "b".to_string())]);
    store.close().unwrap();

    let mut store = open(&temp);
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap(), vec![(ip(4), "b".to_string())]);
}

#[test]
fn test_torn_release_drops_whole_request() {
    let temp = TempDir::new().unwrap();
    let wal = temp.path().join("net1").join("reservations.wal");
    {
        let mut store = open(&temp);
        store.lock().unwrap();
        store.reserve("a", ip(2)).unwrap();
        store.reserve("a", ip(3)).unwrap();
        store.close().unwrap();
    }
    let before = fs::metadata(&wal).unwrap().len();
    {
        let mut store = open(&temp);
        store.lock().unwrap();
        store.release_by_id("a").unwrap();
        store.close().unwrap();
    }
    let after = fs::metadata(&wal).unwrap().len();
    assert!(after > before);

    // the release entry is cut short, as by a crash mid-write
    let file = OpenOptions::new().write(true).open(&wal).unwrap();
    file.set_len(after - 3).unwrap();
    drop(file);

    let mut store = open(&temp);
    store.lock().unwrap();
    assert_eq!(
        store.reservations().unwrap(),
        vec![(ip(2), "a".to_string()), (ip(3), "a".to_string())]
    );
}

// =============================================================================
// Damage Tests
// =============================================================================

#[test]
fn test_torn_journal_tail_is_dropped() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open(&temp);
        store.lock().unwrap();
        store.reserve("a", ip(2)).unwrap();
        store.close().unwrap();
    }

    // simulate a writer killed mid-append
    let wal = temp.path().join("net1").join("reservations.wal");
    let mut file = OpenOptions::new().append(true).open(&wal).unwrap();
    file.write_all(&[7, 0, 0, 0, 0, 0, 0]).unwrap();
    drop(file);

    let mut store = open(&temp);
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap(), vec![(ip(2), "a".to_string())]);

    // and appends continue cleanly afterwards
    store.reserve("b", ip(3)).unwrap();
    store.close().unwrap();

    let mut store = open(&temp);
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap().len(), 2);
}

#[test]
fn test_damaged_journal_length_fails_lock() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open(&temp);
        store.lock().unwrap();
        for n in 2..5 {
            store.reserve(&format!("c{}", n), ip(n)).unwrap();
        }
        store.close().unwrap();
    }

    // high byte of the first entry's length
    let wal = temp.path().join("net1").join("reservations.wal");
    let mut bytes = fs::read(&wal).unwrap();
    bytes[11] ^= 0x01;
    fs::write(&wal, &bytes).unwrap();

    let mut store = open(&temp);
    assert!(matches!(store.lock(), Err(IpamError::StoreCorruption(_))));
    assert!(!store.is_locked());
    assert_eq!(fs::read(&wal).unwrap(), bytes);
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_append_leaves_no_record() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);

    // every write to the journal fails with "no space left on device"
    std::os::unix::fs::symlink("/dev/full", store.dir().join("reservations.wal")).unwrap();

    store.lock().unwrap();
    let result = store.reserve("a", ip(2));

    assert!(matches!(result, Err(IpamError::Io(_))));
    assert!(store.reservations().unwrap().is_empty());
    assert_eq!(store.last_reserved_ip().unwrap(), None);
    store.unlock().unwrap();
}

#[test]
fn test_damaged_snapshot_fails_lock_and_releases_it() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("net1");
    let mut store = open(&temp);
    fs::write(dir.join("reservations.snap"), b"not a snapshot at all, clearly").unwrap();

    assert!(matches!(store.lock(), Err(IpamError::StoreCorruption(_))));
    assert!(!store.is_locked());

    // the file lock was given back: another instance can still take it
    fs::remove_file(dir.join("reservations.snap")).unwrap();
    let mut other = open(&temp);
    other.lock().unwrap();
    other.unlock().unwrap();
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_lock_excludes_other_instance() {
    let temp = TempDir::new().unwrap();
    let mut holder = open(&temp);
    holder.lock().unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let started = Arc::new(Barrier::new(2));

    let waiter = {
        let config = config(&temp);
        let acquired = Arc::clone(&acquired);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            let mut store = DiskStore::open(config, "net1").unwrap();
            started.wait();
            store.lock().unwrap();
            acquired.store(true, Ordering::SeqCst);
            let taken = store.reserve("waiter", IpAddr::from([10, 0, 0, 2])).unwrap();
            store.unlock().unwrap();
            taken
        })
    };

    started.wait();
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    holder.reserve("holder", ip(2)).unwrap();
    holder.unlock().unwrap();

    // the waiter sees the holder's reservation once it gets in
    assert!(!waiter.join().unwrap());
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_drop_releases_lock() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open(&temp);
        store.lock().unwrap();
        store.reserve("a", ip(2)).unwrap();
    }

    let mut store = open(&temp);
    store.lock().unwrap();
    assert_eq!(store.reservations().unwrap().len(), 1);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_twice() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);
    store.lock().unwrap();

    store.close().unwrap();
    store.close().unwrap();
    assert!(!store.is_locked());
}

#[test]
fn test_lock_after_close_fails() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&temp);
    store.close().unwrap();

    assert!(matches!(store.lock(), Err(IpamError::Closed)));
}
