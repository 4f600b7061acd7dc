//! Add/Delete entry points
//!
//! Glue for a host process handling one attach or detach event: open the
//! network's store, build an allocator over it, run a single operation, and
//! close the store on every path out.

use tracing::warn;

use crate::allocator::{IpConfig, SequentialAllocator};
use crate::config::{IpamConfig, StoreConfig};
use crate::error::Result;
use crate::store::{DiskStore, Store};

/// Allocate an address for `container_id` on the configured network
pub fn cmd_add(store_config: StoreConfig, config: IpamConfig, container_id: &str) -> Result<IpConfig> {
    config.validate()?;

    let mut store = DiskStore::open(store_config, &config.name)?;
    let result = SequentialAllocator::new(config, &mut store)
        .and_then(|mut allocator| allocator.allocate(container_id));

    finish(store, result)
}

/// Release every address `container_id` holds on the configured network
pub fn cmd_del(store_config: StoreConfig, config: IpamConfig, container_id: &str) -> Result<()> {
    config.validate()?;

    let mut store = DiskStore::open(store_config, &config.name)?;
    let result = SequentialAllocator::new(config, &mut store)
        .and_then(|mut allocator| allocator.release(container_id));

    finish(store, result)
}

/// Close the store, letting the operation's own error win over a close error
fn finish<T>(mut store: DiskStore, result: Result<T>) -> Result<T> {
    let closed = store.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "failed to close store after error");
            Err(e)
        }
    }
}
