//! Shadow registry - reverse lookup from native address to shadow
//!
//! Trampolines receive only the address of a vtable cell. The registry maps
//! that address back to its container without ever dereferencing it, so a
//! stale address yields a lookup miss instead of a wild read.

use super::ShadowRef;
use core::ffi::c_void;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Global address registry (concurrent map)
static SHADOWS: Lazy<DashMap<usize, ShadowRef>> = Lazy::new(|| DashMap::with_capacity(128));

#[inline]
pub(super) fn register(address: *const c_void, shadow: ShadowRef) {
    SHADOWS.insert(address as usize, shadow);
}

#[inline]
pub(super) fn unregister(address: *const c_void) {
    SHADOWS.remove(&(address as usize));
}

/// Clone of the entry, so no shard lock is held while the caller runs
#[inline]
pub(super) fn lookup(address: *const c_void) -> Option<ShadowRef> {
    SHADOWS
        .get(&(address as usize))
        .map(|entry| entry.value().clone())
}

/// Whether `address` currently belongs to a bound shadow
pub fn is_registered(address: *const c_void) -> bool {
    SHADOWS.contains_key(&(address as usize))
}

/// Number of bound shadow cells across all containers
pub fn registered_count() -> usize {
    SHADOWS.len()
}
