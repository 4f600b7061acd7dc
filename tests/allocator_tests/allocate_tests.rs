//! Tests for address allocation
//!
//! These tests verify:
//! - First-fit after the gateway, then round-robin from the marker
//! - Gateway exclusion (default and explicit)
//! - Pool exhaustion
//! - Requested-address handling
//! - The lock is given back on every path

use hostlocal::store::Store;
use hostlocal::{IpamConfig, IpamError, MemoryStore, Route, SequentialAllocator};

use crate::common::{config, ip, memory_allocator, subnet, BrokenMarker};

// =============================================================================
// Basic Allocation Tests
// =============================================================================

#[test]
fn test_slash30_has_exactly_one_address() {
    let mut allocator = memory_allocator(config("10.0.0.0/30"));

    let result = allocator.allocate("a").unwrap();
    assert_eq!(result.address, ip("10.0.0.2"));
    assert_eq!(result.gateway, ip("10.0.0.1"));
    assert_eq!(result.mask, vec![255, 255, 255, 252]);

    let err = allocator.allocate("b").unwrap_err();
    assert!(matches!(err, IpamError::PoolExhausted { .. }));
    assert_eq!(
        err.to_string(),
        "no IP addresses available in network: net1"
    );
}

#[test]
fn test_sequential_allocation() {
    let mut allocator = memory_allocator(config("10.0.0.0/29"));

    let addrs: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| allocator.allocate(id).unwrap().address)
        .collect();

    assert_eq!(addrs, vec![ip("10.0.0.2"), ip("10.0.0.3"), ip("10.0.0.4")]);
}

#[test]
fn test_round_robin_does_not_reuse_released_address_immediately() {
    let mut allocator = memory_allocator(config("10.0.0.0/29"));
    allocator.allocate("a").unwrap();
    allocator.allocate("b").unwrap();

    allocator.release("a").unwrap();

    assert_eq!(allocator.allocate("c").unwrap().address, ip("10.0.0.4"));
}

#[test]
fn test_round_robin_wraps_to_range_start() {
    let mut allocator = memory_allocator(config("10.0.0.0/29"));
    for id in ["a", "b", "c", "d", "e"] {
        allocator.allocate(id).unwrap();
    }
    allocator.release("b").unwrap();

    // marker is .6, the last candidate; the walk wraps past the gateway
    assert_eq!(allocator.allocate("f").unwrap().address, ip("10.0.0.3"));
}

#[test]
fn test_exhaustion() {
    let mut allocator = memory_allocator(config("10.0.0.0/29"));
    for id in ["a", "b", "c", "d", "e"] {
        allocator.allocate(id).unwrap();
    }

    assert!(matches!(
        allocator.allocate("f"),
        Err(IpamError::PoolExhausted { .. })
    ));
    assert_eq!(allocator.store().reservations().len(), 5);
}

#[test]
fn test_ipv6_allocation() {
    let mut allocator = memory_allocator(config("fd00::/120"));

    let result = allocator.allocate("a").unwrap();

    assert_eq!(result.address, ip("fd00::2"));
    assert_eq!(result.gateway, ip("fd00::1"));
    assert_eq!(allocator.allocate("b").unwrap().address, ip("fd00::3"));
}

#[test]
fn test_routes_pass_through() {
    let route: Route = "0.0.0.0/0,10.0.0.254".parse().unwrap();
    let config = IpamConfig::builder()
        .name("net1")
        .subnet(subnet("10.0.0.0/24"))
        .route(route.clone())
        .build()
        .unwrap();
    let mut allocator = memory_allocator(config);

    let result = allocator.allocate("a").unwrap();

    assert_eq!(result.routes, vec![route]);
    assert_eq!(
        result.to_string(),
        "address: 10.0.0.2/24\ngateway: 10.0.0.1\nroute: 0.0.0.0/0 via 10.0.0.254"
    );
}

// =============================================================================
// Gateway Tests
// =============================================================================

#[test]
fn test_explicit_gateway_is_skipped() {
    let config = IpamConfig::builder()
        .name("net1")
        .subnet(subnet("10.0.0.0/29"))
        .gateway(ip("10.0.0.3"))
        .build()
        .unwrap();
    let mut allocator = memory_allocator(config);

    let addrs: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| allocator.allocate(id).unwrap().address)
        .collect();

    assert_eq!(addrs, vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.4")]);
    assert_eq!(allocator.gateway(), ip("10.0.0.3"));
}

#[test]
fn test_default_gateway_never_allocated() {
    let mut allocator = memory_allocator(config("10.0.0.0/28"));

    while let Ok(result) = allocator.allocate("x") {
        assert_ne!(result.address, ip("10.0.0.1"));
    }
    assert_eq!(allocator.store().reservations().len(), 13);
}

// =============================================================================
// Requested Address Tests
// =============================================================================

fn requesting(addr: &str) -> IpamConfig {
    IpamConfig::builder()
        .name("net1")
        .subnet(subnet("10.0.0.0/24"))
        .requested_ip(ip(addr))
        .build()
        .unwrap()
}

#[test]
fn test_requested_address_is_reserved() {
    let mut allocator = memory_allocator(requesting("10.0.0.77"));

    assert_eq!(allocator.allocate("a").unwrap().address, ip("10.0.0.77"));
    assert_eq!(
        allocator.store().reservations(),
        vec![(ip("10.0.0.77"), "a".to_string())]
    );
}

#[test]
fn test_requested_address_taken() {
    let store = MemoryStore::new();
    let mut first = SequentialAllocator::new(requesting("10.0.0.77"), store.clone()).unwrap();
    let mut second = SequentialAllocator::new(requesting("10.0.0.77"), store.clone()).unwrap();
    let mut searching = SequentialAllocator::new(config("10.0.0.0/24"), store.clone()).unwrap();
    first.allocate("a").unwrap();

    // move the marker off the requested address
    assert_eq!(searching.allocate("c").unwrap().address, ip("10.0.0.78"));

    let err = second.allocate("b").unwrap_err();

    assert!(matches!(err, IpamError::AddressUnavailable { .. }));
    assert_eq!(
        err.to_string(),
        "requested IP address 10.0.0.77 is not available in network: net1"
    );
    assert_eq!(
        store.reservations(),
        vec![
            (ip("10.0.0.77"), "a".to_string()),
            (ip("10.0.0.78"), "c".to_string()),
        ]
    );

    let mut inspect = store.clone();
    inspect.lock().unwrap();
    assert_eq!(inspect.last_reserved_ip().unwrap(), Some(ip("10.0.0.78")));
    inspect.unlock().unwrap();
}

#[test]
fn test_requested_gateway_rejected() {
    let mut allocator = memory_allocator(requesting("10.0.0.1"));

    assert!(matches!(
        allocator.allocate("a"),
        Err(IpamError::InvalidRequest(gw)) if gw == ip("10.0.0.1")
    ));
    assert!(allocator.store().reservations().is_empty());
}

#[test]
fn test_requested_address_outside_subnet() {
    let mut allocator = memory_allocator(requesting("10.0.1.5"));

    assert!(matches!(
        allocator.allocate("a"),
        Err(IpamError::OutOfRange { .. })
    ));
    assert!(allocator.store().reservations().is_empty());
}

// =============================================================================
// Lock and Marker Tests
// =============================================================================

#[test]
fn test_lock_released_after_success_and_failure() {
    let mut allocator = memory_allocator(config("10.0.0.0/30"));

    allocator.allocate("a").unwrap();
    assert!(!allocator.store().is_locked());

    allocator.allocate("b").unwrap_err();
    assert!(!allocator.store().is_locked());

    // a fresh instance can still take the lock
    let mut other = allocator.store().clone();
    other.lock().unwrap();
    other.unlock().unwrap();
}

#[test]
fn test_unreadable_marker_falls_back_to_range_start() {
    let store = MemoryStore::new();
    let mut seeded = SequentialAllocator::new(config("10.0.0.0/29"), store.clone()).unwrap();
    seeded.allocate("a").unwrap();
    seeded.allocate("b").unwrap();
    seeded.release("a").unwrap();

    let mut allocator =
        SequentialAllocator::new(config("10.0.0.0/29"), BrokenMarker(store.clone())).unwrap();

    // a readable marker (.3) would have led to .4
    assert_eq!(allocator.allocate("c").unwrap().address, ip("10.0.0.2"));
}

#[test]
fn test_marker_outside_new_range_is_ignored() {
    let store = MemoryStore::new();
    let narrow = |start: &str, end: &str| {
        IpamConfig::builder()
            .name("net1")
            .subnet(subnet("10.0.0.0/24"))
            .range_start(ip(start))
            .range_end(ip(end))
            .build()
            .unwrap()
    };

    let mut before = SequentialAllocator::new(narrow("10.0.0.10", "10.0.0.12"), store.clone()).unwrap();
    assert_eq!(before.allocate("a").unwrap().address, ip("10.0.0.10"));

    let mut after = SequentialAllocator::new(narrow("10.0.0.20", "10.0.0.22"), store.clone()).unwrap();
    assert_eq!(after.allocate("b").unwrap().address, ip("10.0.0.20"));
}
