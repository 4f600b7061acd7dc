//! Reservation Table Module
//!
//! In-memory view of a network's reservations, rebuilt from the snapshot and
//! journal each time the store lock is taken.
//!
//! ## Responsibilities
//! - Address → owner lookups for reserve
//! - Owner → addresses lookups for release-by-owner
//! - Track the last-reserved marker
//! - Ordered iteration for snapshot creation
//!
//! ## Data Structure Choice
//! A `BTreeMap` keyed by address keeps snapshot output and inspection in
//! address order; a secondary `HashMap` of owner → address set keeps
//! release-by-owner proportional to what the owner holds.

mod reservations;

pub use reservations::ReservationTable;
