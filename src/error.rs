//! Error types for hostlocal
//!
//! Provides a unified error type for allocation and store operations.

use std::net::IpAddr;

use thiserror::Error;

/// Result type alias using IpamError
pub type Result<T> = std::result::Result<T, IpamError>;

/// Unified error type for hostlocal operations
#[derive(Debug, Error)]
pub enum IpamError {
    // -------------------------------------------------------------------------
    // Configuration Errors (raised at allocator construction)
    // -------------------------------------------------------------------------
    #[error("invalid subnet: {0}")]
    InvalidSubnet(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("requested IP must differ from gateway IP {0}")]
    InvalidRequest(IpAddr),

    #[error("requested IP {addr} not in network {subnet}")]
    OutOfRange { addr: IpAddr, subnet: String },

    #[error("requested IP address {addr} is not available in network: {network}")]
    AddressUnavailable { addr: IpAddr, network: String },

    #[error("no IP addresses available in network: {network}")]
    PoolExhausted { network: String },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store corruption detected: {0}")]
    StoreCorruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store is not locked: {0}")]
    NotLocked(&'static str),

    #[error("store is closed")]
    Closed,
}

impl IpamError {
    /// Whether this error came from the durable medium rather than the request
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            IpamError::Io(_)
                | IpamError::StoreCorruption(_)
                | IpamError::Serialization(_)
                | IpamError::NotLocked(_)
                | IpamError::Closed
        )
    }
}

impl From<bincode::Error> for IpamError {
    fn from(e: bincode::Error) -> Self {
        IpamError::Serialization(e.to_string())
    }
}
