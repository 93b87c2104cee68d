//! Foreign objects - reference-counted wrappers around native pointers
//!
//! Design: a `ForeignObject` owns exactly one reference to a foreign object
//! and forwards the identity contract (QueryInterface, AddRef, Release) to the
//! object's own vtable. Identity is the pointer value.
//!
//! Disposal is split into two entry points routed through one idempotent core:
//! - `dispose()` - deterministic release by the owner
//! - `finalize()` - best-effort cleanup on scope exit (also run by `Drop`)
//!
//! The pointer is cleared with an atomic swap before anything else happens, so
//! Release runs at most once no matter how many threads race to dispose.

mod handle;
mod tracker;


pub use handle::{NativeHandle, NoHooks, PointerHooks};
pub use tracker::{ObjectReference, ObjectTracker};

use crate::abi;
use crate::config::{self, InteropConfig};
use crate::diagnostics;
use crate::error::{InteropError, Result};
use crate::guid::{Guid, IID_IUNKNOWN};
use crate::interface::{Interface, Unknown};
use crate::logging::{log_dispose, log_query_interface};
use crate::shadow::CallbackObject;
use core::ffi::c_void;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ptr::{self, NonNull};
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Wrapper instance ids; 0 is reserved for "not tracked"
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct ForeignObject {
    handle: NativeHandle,
    id: u64,
    config: InteropConfig,
    type_name: &'static str,
    location: &'static Location<'static>,
    /// Creating thread; owns the entry under thread-local tracking
    thread: ThreadId,
}

impl ForeignObject {
    /// Wrap `pointer`, taking ownership of one reference (no AddRef)
    ///
    /// # Safety
    /// `pointer` must be null or a live foreign object whose reference the
    /// caller hands over.
    #[track_caller]
    pub unsafe fn from_raw(pointer: *mut c_void) -> Self {
        Self::adopt(pointer, <Self as Interface>::NAME, config::current())
    }

    /// Like `from_raw`, with an explicit configuration
    ///
    /// # Safety
    /// Same as `from_raw`.
    #[track_caller]
    pub unsafe fn from_raw_with_config(pointer: *mut c_void, config: InteropConfig) -> Self {
        Self::adopt(pointer, <Self as Interface>::NAME, config)
    }

    /// Foreign identity of a callback object, holding a fresh reference
    #[track_caller]
    pub fn from_callback(callback: &CallbackObject) -> Self {
        Self::from_callback_with_config(callback, config::current())
    }

    #[track_caller]
    pub fn from_callback_with_config(callback: &CallbackObject, config: InteropConfig) -> Self {
        callback.add_ref();
        // SAFETY: the identity cell stays registered while the reference taken above is held
        unsafe { Self::adopt(callback.identity_ptr(), <Self as Interface>::NAME, config) }
    }

    /// Wrapper holding no object
    #[track_caller]
    pub fn null() -> Self {
        // SAFETY: null carries no reference
        unsafe { Self::adopt(ptr::null_mut(), <Self as Interface>::NAME, config::current()) }
    }

    #[track_caller]
    pub(crate) unsafe fn adopt(
        pointer: *mut c_void,
        type_name: &'static str,
        config: InteropConfig,
    ) -> Self {
        let object = Self {
            handle: NativeHandle::new(pointer),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            type_name,
            location: Location::caller(),
            thread: thread::current().id(),
        };

        if config.object_tracking && !pointer.is_null() {
            ObjectTracker::track(&object);
        }

        object
    }

    #[inline]
    pub fn native_pointer(&self) -> *mut c_void {
        self.handle.get()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn config(&self) -> InteropConfig {
        self.config
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Thread the wrapper was created on
    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Replace the pointer, releasing the old one and AddRef'ing the new one
    ///
    /// # Safety
    /// `pointer` must be null or a live foreign object. Not synchronized with
    /// concurrent disposal.
    pub unsafe fn set_native_pointer(&self, pointer: *mut c_void) {
        self.handle.set(pointer, self);
    }

    /// Query `from` for `iid` and make the result this wrapper's object
    ///
    /// The previous pointer is released either way; on failure the wrapper
    /// is left null and the query error is returned.
    pub fn query_interface_from(&self, from: &impl Unknown, iid: &Guid) -> Result<()> {
        let queried = from.query_interface_raw(iid);
        let pointer = queried.as_ref().map_or(ptr::null_mut(), |found| found.as_ptr());
        self.handle.attach(pointer, self);

        if self.config.object_tracking {
            if pointer.is_null() {
                ObjectTracker::untrack(self);
            } else {
                ObjectTracker::track(self);
            }
        }

        queried.map(|_| ())
    }

    /// Deterministic disposal: releases the foreign reference exactly once
    pub fn dispose(&self) {
        self.dispose_core(true);
    }

    /// Best-effort disposal on scope exit; releases only if configured to
    pub fn finalize(&self) {
        self.dispose_core(false);
    }

    /// Give up ownership of the reference without releasing it
    pub fn into_raw(self) -> *mut c_void {
        let pointer = self.handle.take();
        if self.config.object_tracking {
            ObjectTracker::untrack(&self);
        }
        pointer
    }

    fn dispose_core(&self, disposing: bool) {
        let pointer = self.handle.take();
        if pointer.is_null() {
            return;
        }

        let config = self.config;

        if !disposing && config.leak_tracking_on_finalizer && !config.release_on_finalizer {
            let reference = ObjectTracker::find(self);
            diagnostics::report_leak(&format!(
                "Warning: Live {}#{} [0x{:X}], potential memory leak: {}",
                self.type_name, self.id, pointer as usize, reference
            ));
        }

        let released = disposing || config.release_on_finalizer;
        if released {
            // SAFETY: `take` handed this thread the only copy of our reference
            unsafe { abi::release(pointer) };
        }

        if config.object_tracking {
            ObjectTracker::untrack(self);
        }

        log_dispose(pointer, disposing, released);
    }

    pub(crate) fn describe(&self) -> ObjectReference {
        ObjectReference {
            id: self.id,
            pointer: self.native_pointer() as usize,
            type_name: self.type_name,
            location: Some(self.location),
        }
    }
}

/// QueryInterface through `pointer`'s vtable, mapping failure to an error
///
/// # Safety
/// `pointer` must be null or a live foreign object.
pub(crate) unsafe fn query_raw(pointer: *mut c_void, iid: &Guid) -> Result<NonNull<c_void>> {
    if pointer.is_null() {
        return Err(InteropError::NullPointer);
    }

    let (code, object) = abi::query_interface(pointer, iid);
    log_query_interface(pointer, iid, code);
    code.check_query(iid)?;

    NonNull::new(object).ok_or(InteropError::NullPointer)
}

impl PointerHooks for ForeignObject {
    fn native_pointer_updating(&self, current: *mut c_void) {
        if !current.is_null() {
            // SAFETY: the handle owned this reference
            unsafe { abi::release(current) };
        }
    }

    fn native_pointer_updated(&self, current: *mut c_void, _previous: *mut c_void) {
        if !current.is_null() {
            // SAFETY: `set_native_pointer` requires a live object
            unsafe { abi::add_ref(current) };
        }

        if self.config.object_tracking {
            if current.is_null() {
                ObjectTracker::untrack(self);
            } else {
                ObjectTracker::track(self);
            }
        }
    }
}

impl Unknown for ForeignObject {
    fn query_interface_raw(&self, iid: &Guid) -> Result<NonNull<c_void>> {
        // SAFETY: the handle is null or owns a reference to a live object
        unsafe { query_raw(self.native_pointer(), iid) }
    }

    fn add_ref(&self) -> u32 {
        let pointer = self.native_pointer();
        if pointer.is_null() {
            return 0;
        }
        // SAFETY: the handle owns a reference, so the object is live
        unsafe { abi::add_ref(pointer) }
    }

    unsafe fn release(&self) -> u32 {
        let pointer = self.native_pointer();
        if pointer.is_null() {
            return 0;
        }
        abi::release(pointer)
    }

    fn config(&self) -> InteropConfig {
        self.config
    }
}

impl Interface for ForeignObject {
    const IID: Guid = IID_IUNKNOWN;
    const NAME: &'static str = "IUnknown";

    fn from_object(object: ForeignObject) -> Self {
        object
    }

    fn as_object(&self) -> &ForeignObject {
        self
    }

    fn into_object(self) -> ForeignObject {
        self
    }
}

impl Clone for ForeignObject {
    /// New wrapper holding its own reference to the same object
    #[track_caller]
    fn clone(&self) -> Self {
        let pointer = self.native_pointer();
        if !pointer.is_null() {
            // SAFETY: we hold a reference, so the object is live
            unsafe { abi::add_ref(pointer) };
        }
        // SAFETY: the AddRef above is the reference the new wrapper owns
        unsafe { Self::adopt(pointer, self.type_name, self.config) }
    }
}

impl Default for ForeignObject {
    #[track_caller]
    fn default() -> Self {
        Self::null()
    }
}

impl Drop for ForeignObject {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl PartialEq for ForeignObject {
    fn eq(&self, other: &Self) -> bool {
        self.native_pointer() == other.native_pointer()
    }
}

impl Eq for ForeignObject {}

impl Hash for ForeignObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.native_pointer().hash(state);
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("type", &self.type_name)
            .field("id", &self.id)
            .field("pointer", &self.native_pointer())
            .finish()
    }
}
