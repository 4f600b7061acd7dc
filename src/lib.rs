//! # hostlocal
//!
//! Sequential IP address management for container networks, with:
//! - Round-robin allocation over a subnet or sub-range
//! - A crash-tolerant reservation store (journal + snapshot)
//! - Exclusive, cross-process locking around every request
//! - An in-memory store for tests and embedding
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  cmd_add / cmd_del                           │
//! │              (one request per process)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Sequential Allocator                          │
//! │     (effective range, round-robin search, requested IP)      │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐              ┌────────────────────┐
//!   │ Address Range   │              │  Store (trait)     │
//!   │ Math (net)      │              │  lock → … → unlock │
//!   └─────────────────┘              └─────────┬──────────┘
//!                                              │
//!                          ┌───────────────────┴──────────┐
//!                          ▼                              ▼
//!                   ┌─────────────┐               ┌─────────────┐
//!                   │  DiskStore  │               │ MemoryStore │
//!                   │ WAL + snap  │               │   (tests)   │
//!                   └─────────────┘               └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod net;
pub mod wal;
pub mod table;
pub mod storage;
pub mod store;
pub mod allocator;
pub mod plugin;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{IpamError, Result};
pub use config::{IpamConfig, Route, StoreConfig, SyncStrategy};
pub use net::Subnet;
pub use store::{DiskStore, MemoryStore, Store};
pub use allocator::{IpConfig, SequentialAllocator};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hostlocal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
