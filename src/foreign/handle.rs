//! Native handle - the raw pointer slot behind every foreign wrapper
//!
//! Replacing the pointer always runs through a hook pair so the owner can
//! release the old reference and acquire the new one. The handle itself does
//! not serialize `set`; only `take` is an atomic test-and-clear.

use core::ffi::c_void;
use core::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Callbacks run around a pointer replacement
pub trait PointerHooks {
    /// Called before the pointer changes, with the value being replaced
    fn native_pointer_updating(&self, _current: *mut c_void) {}

    /// Called after the pointer changed
    fn native_pointer_updated(&self, _current: *mut c_void, _previous: *mut c_void) {}
}

/// Hooks that do nothing, for handles with no refcount semantics
pub struct NoHooks;

impl PointerHooks for NoHooks {}

pub struct NativeHandle {
    pointer: AtomicPtr<c_void>,
}

impl NativeHandle {
    #[inline]
    pub const fn null() -> Self {
        Self {
            pointer: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Wrap a pointer without running hooks
    #[inline]
    pub const fn new(pointer: *mut c_void) -> Self {
        Self {
            pointer: AtomicPtr::new(pointer),
        }
    }

    /// Current pointer, possibly null
    #[inline]
    pub fn get(&self) -> *mut c_void {
        self.pointer.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.get().is_null()
    }

    /// Replace the pointer: `updating(old)`, store, `updated(new, old)`
    ///
    /// Setting the value already held is a no-op, so the owned reference is
    /// never released before it is reacquired.
    pub fn set(&self, pointer: *mut c_void, hooks: &impl PointerHooks) {
        let previous = self.get();
        if previous == pointer {
            return;
        }
        hooks.native_pointer_updating(previous);
        self.pointer.store(pointer, Ordering::Release);
        hooks.native_pointer_updated(pointer, previous);
    }

    /// Replace the pointer with one that already carries a reference
    ///
    /// Runs only `updating(old)`; the acquire step is skipped because
    /// ownership of `pointer` is transferred to the handle.
    pub fn attach(&self, pointer: *mut c_void, hooks: &impl PointerHooks) {
        let previous = self.get();
        hooks.native_pointer_updating(previous);
        self.pointer.store(pointer, Ordering::Release);
    }

    /// Atomically clear the pointer, bypassing hooks
    ///
    /// Exactly one concurrent caller observes the non-null value.
    #[inline]
    pub fn take(&self) -> *mut c_void {
        self.pointer.swap(ptr::null_mut(), Ordering::AcqRel)
    }
}

impl Default for NativeHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl core::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NativeHandle({:p})", self.get())
    }
}
