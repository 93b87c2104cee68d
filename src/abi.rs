//! Binary layout of the foreign object contract
//!
//! A foreign object is addressed by a pointer to a cell whose first word
//! points at the vtable. The first three slots are always, in order:
//! QueryInterface, AddRef, Release. All methods use the `system` calling
//! convention (stdcall on 32-bit Windows, C elsewhere).

use crate::guid::Guid;
use crate::result::ResultCode;
use core::ffi::c_void;

pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: *mut c_void, riid: *const Guid, object: *mut *mut c_void) -> i32;
pub type AddRefFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

/// Number of slots every vtable reserves for the identity methods
pub const BASE_SLOT_COUNT: usize = 3;

pub const QUERY_INTERFACE_SLOT: usize = 0;
pub const ADD_REF_SLOT: usize = 1;
pub const RELEASE_SLOT: usize = 2;

/// Identity prefix shared by every vtable
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: QueryInterfaceFn,
    pub add_ref: AddRefFn,
    pub release: ReleaseFn,
}

/// Read the vtable pointer stored in the cell `this` points at
///
/// # Safety
/// `this` must point at a live object's vtable cell
#[inline(always)]
pub unsafe fn vtable<T>(this: *mut c_void) -> *const T {
    *(this as *const *const T)
}

/// Read raw slot `index` of an object's vtable
///
/// # Safety
/// `this` must be live and its vtable must have more than `index` slots
#[inline]
pub unsafe fn slot(this: *mut c_void, index: usize) -> *const c_void {
    let table = vtable::<*const c_void>(this);
    *table.add(index)
}

/// Issue QueryInterface through the object's own vtable
///
/// On failure the returned pointer is null regardless of what the callee wrote.
///
/// # Safety
/// `this` must be a live foreign object
#[inline]
pub unsafe fn query_interface(this: *mut c_void, iid: &Guid) -> (ResultCode, *mut c_void) {
    let vtbl = &*vtable::<IUnknownVtbl>(this);
    let mut object = core::ptr::null_mut();
    let code = ResultCode((vtbl.query_interface)(this, iid, &mut object));
    if code.is_failure() {
        object = core::ptr::null_mut();
    }
    (code, object)
}

/// # Safety
/// `this` must be a live foreign object
#[inline]
pub unsafe fn add_ref(this: *mut c_void) -> u32 {
    let vtbl = &*vtable::<IUnknownVtbl>(this);
    (vtbl.add_ref)(this)
}

/// # Safety
/// `this` must be a live foreign object and the caller must own the
/// reference being released
#[inline]
pub unsafe fn release(this: *mut c_void) -> u32 {
    let vtbl = &*vtable::<IUnknownVtbl>(this);
    (vtbl.release)(this)
}
