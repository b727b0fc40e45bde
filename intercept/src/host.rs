//! Key query and allocation services the host exposes to callbacks.

use crate::types::{HostError, KeyHandle, KeyObject, PoolTag};

/// Services a registry callback may use while handling a notification.
///
/// All methods are bounded-cost and may be called concurrently from any
/// number of callback threads.
pub trait RegistryHost: Send + Sync {
    /// Obtain a query-only handle for `object`.
    fn open_key(&self, object: KeyObject) -> Result<KeyHandle, HostError>;

    /// Copy the key's full path into `buffer` and return the number of units
    /// written. The name is not terminated.
    ///
    /// When `buffer` is too small, nothing is copied and
    /// [`HostError::BufferTooSmall`] carries the required length; passing an
    /// empty buffer is the size query.
    fn query_key_name(&self, handle: &KeyHandle, buffer: &mut [u16]) -> Result<usize, HostError>;

    /// Give back a handle from [`open_key`](Self::open_key).
    fn close_key(&self, handle: KeyHandle);

    /// Allocate an empty buffer with room for at least `units` UTF-16 units.
    ///
    /// Pushing up to `units` elements never reallocates.
    fn allocate(&self, units: usize, tag: PoolTag) -> Result<Vec<u16>, HostError> {
        pool_allocate(units, tag)
    }
}

/// Fallible tagged allocation backing [`RegistryHost::allocate`]. Hosts that
/// override `allocate` delegate here once their own checks pass.
pub fn pool_allocate(units: usize, tag: PoolTag) -> Result<Vec<u16>, HostError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(units)
        .map_err(|_| HostError::InsufficientResources)?;
    log::trace!("Allocated {} units [{}]", units, tag.as_str());
    Ok(buffer)
}
