//! Synthesized vtables
//!
//! A `Vtbl` is built in layers. The base layer reserves the identity prefix
//! (QueryInterface, AddRef, Release); every extending layer asks its parent
//! for `own + number_of_methods` slots and appends its own trampolines, so a
//! derived interface can extend any layer without renumbering.

use super::container::{add_ref_impl, query_interface_impl, release_impl};
use crate::abi::{AddRefFn, QueryInterfaceFn, ReleaseFn, BASE_SLOT_COUNT};
use core::ffi::c_void;

pub struct Vtbl {
    slots: Vec<*const c_void>,
    declared: usize,
}

// Safety: slots are immutable function addresses once the table is built
unsafe impl Send for Vtbl {}
unsafe impl Sync for Vtbl {}

impl Vtbl {
    /// Identity prefix plus room for `number_of_methods` derived slots
    pub fn new(number_of_methods: usize) -> Self {
        let declared = BASE_SLOT_COUNT + number_of_methods;
        let mut vtbl = Self {
            slots: Vec::with_capacity(declared),
            declared,
        };

        vtbl.add_method(query_interface_impl as QueryInterfaceFn as *const c_void);
        vtbl.add_method(add_ref_impl as AddRefFn as *const c_void);
        vtbl.add_method(release_impl as ReleaseFn as *const c_void);
        vtbl
    }

    /// Append the next slot
    ///
    /// # Panics
    /// If every declared slot is already filled.
    pub fn add_method(&mut self, method: *const c_void) {
        assert!(
            self.slots.len() < self.declared,
            "vtable overflow: all {} declared slots are filled",
            self.declared
        );
        self.slots.push(method);
    }

    /// Slots filled so far
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots the layers promised
    #[inline]
    pub fn declared(&self) -> usize {
        self.declared
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.slots.len() == self.declared
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<*const c_void> {
        self.slots.get(index).copied()
    }

    /// Address published in a shadow's vtable cell
    #[inline]
    pub fn as_ptr(&self) -> *const *const c_void {
        self.slots.as_ptr()
    }
}

impl core::fmt::Debug for Vtbl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vtbl")
            .field("slots", &self.slots.len())
            .field("declared", &self.declared)
            .finish()
    }
}
