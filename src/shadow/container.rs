//! Shadow container - the foreign-visible cells of one callback object
//!
//! Design:
//! - Cell 0 is the identity shadow, answering `IID_IUNKNOWN`
//! - Every other cell is one declared facet (ids + vtable + callback target)
//! - One atomic reference count is shared by all cells
//! - At zero the cells are unregistered and their vtable pointers cleared

use super::registry;
use super::vtbl::Vtbl;
use super::{ShadowFacet, ShadowRef, UNKNOWN_VTBL};
use crate::guid::{Guid, IID_IUNKNOWN};
use crate::logging::{log_query_interface, log_shadow_bound, log_shadow_disposed, warn};
use crate::result::ResultCode;
use core::ffi::c_void;
use core::ptr::{self, NonNull};
use std::any::Any;
use std::sync::atomic::{fence, AtomicPtr, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// What a foreign caller holds: the address of a vtable pointer
#[repr(C)]
pub(super) struct ShadowCell {
    vtbl: AtomicPtr<*const c_void>,
}

pub(super) struct Shadow {
    pub(super) iids: Vec<Guid>,
    pub(super) name: &'static str,
    pub(super) target: Option<Box<dyn Any + Send + Sync>>,
    cell: Box<ShadowCell>,
}

impl Shadow {
    fn new(
        iids: Vec<Guid>,
        name: &'static str,
        vtbl: &'static Vtbl,
        target: Option<Box<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            iids,
            name,
            target,
            cell: Box::new(ShadowCell {
                vtbl: AtomicPtr::new(vtbl.as_ptr() as *mut *const c_void),
            }),
        }
    }

    #[inline]
    pub(super) fn address(&self) -> *mut c_void {
        &*self.cell as *const ShadowCell as *mut c_void
    }

    #[inline]
    fn answers(&self, iid: &Guid) -> bool {
        self.iids.contains(iid)
    }
}

impl From<ShadowFacet> for Shadow {
    fn from(facet: ShadowFacet) -> Self {
        Self::new(facet.iids, facet.name, facet.vtbl, Some(facet.target))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShadowState {
    /// Vtables built, not yet reachable from foreign code
    Unbound = 0,
    Bound = 1,
    Disposed = 2,
}

impl ShadowState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Bound,
            _ => Self::Disposed,
        }
    }
}

pub struct ShadowContainer {
    shadows: Vec<Shadow>,
    pub(super) owner: Option<Arc<dyn Any + Send + Sync>>,
    refs: AtomicU32,
    state: AtomicU8,
}

impl ShadowContainer {
    /// Build the cells; the creator holds the initial reference
    pub(super) fn new(
        facets: Vec<ShadowFacet>,
        owner: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Arc<Self> {
        let mut shadows = Vec::with_capacity(facets.len() + 1);
        shadows.push(Shadow::new(vec![IID_IUNKNOWN], "IUnknown", &UNKNOWN_VTBL, None));
        shadows.extend(facets.into_iter().map(Shadow::from));

        Arc::new(Self {
            shadows,
            owner,
            refs: AtomicU32::new(1),
            state: AtomicU8::new(ShadowState::Unbound as u8),
        })
    }

    /// Register every cell so trampolines can find it
    pub(super) fn bind(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                ShadowState::Unbound as u8,
                ShadowState::Bound as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        for (index, shadow) in self.shadows.iter().enumerate() {
            registry::register(
                shadow.address(),
                ShadowRef {
                    container: Arc::clone(self),
                    index,
                },
            );
        }

        log_shadow_bound(self.identity(), self.shadows.len() - 1);
    }

    #[inline]
    pub fn state(&self) -> ShadowState {
        ShadowState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Address of the identity cell; stable for the container's lifetime
    #[inline]
    pub fn identity(&self) -> *mut c_void {
        self.shadows[0].address()
    }

    /// Cell answering `iid`, without taking a reference
    pub fn find(&self, iid: &Guid) -> Option<NonNull<c_void>> {
        if self.state() != ShadowState::Bound {
            return None;
        }

        let shadow = if *iid == IID_IUNKNOWN {
            &self.shadows[0]
        } else {
            self.shadows[1..].iter().find(|shadow| shadow.answers(iid))?
        };

        NonNull::new(shadow.address())
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    #[inline]
    pub fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop one reference; the last one disposes every shadow
    pub fn release(&self) -> u32 {
        let previous = self
            .refs
            .fetch_update(Ordering::Release, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            });

        match previous {
            Ok(1) => {
                fence(Ordering::Acquire);
                self.dispose();
                0
            }
            Ok(count) => count - 1,
            Err(_) => {
                warn!(
                    event = "release_underflow",
                    address = ?self.identity(),
                    "Release called on a container with no references"
                );
                0
            }
        }
    }

    pub(super) fn shadow(&self, index: usize) -> &Shadow {
        &self.shadows[index]
    }

    pub(super) fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    fn dispose(&self) {
        if self.state.swap(ShadowState::Disposed as u8, Ordering::AcqRel)
            == ShadowState::Disposed as u8
        {
            return;
        }

        for shadow in &self.shadows {
            registry::unregister(shadow.address());
            shadow.cell.vtbl.store(ptr::null_mut(), Ordering::Release);
        }

        log_shadow_disposed(self.identity());
    }
}

impl core::fmt::Debug for ShadowContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShadowContainer")
            .field("identity", &self.identity())
            .field("shadows", &self.shadows.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("refs", &self.ref_count())
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Identity trampolines shared by every synthesized vtable
// ============================================================================

pub(super) unsafe extern "system" fn query_interface_impl(
    this: *mut c_void,
    riid: *const Guid,
    object: *mut *mut c_void,
) -> i32 {
    if object.is_null() {
        return ResultCode::POINTER.code();
    }
    *object = ptr::null_mut();

    if riid.is_null() {
        return ResultCode::POINTER.code();
    }
    let iid = *riid;

    let shadow = match ShadowRef::from_this(this) {
        Ok(shadow) => shadow,
        Err(error) => return error.result_code().code(),
    };

    let code = match shadow.container.find(&iid) {
        Some(found) => {
            shadow.container.add_ref();
            *object = found.as_ptr();
            ResultCode::OK
        }
        None => ResultCode::NO_INTERFACE,
    };

    log_query_interface(this, &iid, code);
    code.code()
}

pub(super) unsafe extern "system" fn add_ref_impl(this: *mut c_void) -> u32 {
    match ShadowRef::from_this(this) {
        Ok(shadow) => shadow.container.add_ref(),
        Err(_) => 0,
    }
}

pub(super) unsafe extern "system" fn release_impl(this: *mut c_void) -> u32 {
    match ShadowRef::from_this(this) {
        Ok(shadow) => shadow.container.release(),
        Err(_) => 0,
    }
}
