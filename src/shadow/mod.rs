//! Callback shadows - exposing Rust objects to foreign code
//!
//! Design:
//! - A `Callback` declares its facets: interface ids, a synthesized `Vtbl`
//!   and the target the trampolines call into
//! - `CallbackObject` owns the `ShadowContainer` holding one cell per facet
//!   plus the identity cell
//! - Trampolines map `this` back to its shadow through an address registry,
//!   run the callback under `dispatch`, and return status codes only
//!
//! Foreign code sees a plain object: the address of a vtable pointer whose
//! first three slots are QueryInterface, AddRef and Release.

mod container;
mod registry;
pub mod stream;
mod vtbl;

#[cfg(test)]
mod tests;

pub use container::{ShadowContainer, ShadowState};
pub use registry::{is_registered, registered_count};
pub use vtbl::Vtbl;

use crate::error::{InteropError, Result};
use crate::guid::Guid;
use crate::interface::Unknown;
use crate::logging::log_callback_error;
use crate::result::ResultCode;
use core::ffi::c_void;
use core::fmt;
use core::ptr::{self, NonNull};
use once_cell::sync::Lazy;
use std::any::{self, Any};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Vtable of the identity cell: the base slots and nothing else
static UNKNOWN_VTBL: Lazy<Vtbl> = Lazy::new(|| Vtbl::new(0));

/// An interface Rust code can implement for foreign callers
pub trait ShadowInterface {
    const IID: Guid;
    const NAME: &'static str;

    /// Base interface ids the same vtable also satisfies
    const ALSO: &'static [Guid] = &[];

    fn vtbl() -> &'static Vtbl;
}

/// One foreign-visible face of a callback object
pub struct ShadowFacet {
    iids: Vec<Guid>,
    name: &'static str,
    vtbl: &'static Vtbl,
    target: Box<dyn Any + Send + Sync>,
}

impl ShadowFacet {
    /// # Panics
    /// If `vtbl` has fewer slots filled than its layers declared.
    pub fn new<T: Any + Send + Sync>(
        iid: Guid,
        name: &'static str,
        vtbl: &'static Vtbl,
        target: T,
    ) -> Self {
        assert!(
            vtbl.is_complete(),
            "{}: vtable has {} of {} declared slots",
            name,
            vtbl.len(),
            vtbl.declared()
        );

        Self {
            iids: vec![iid],
            name,
            vtbl,
            target: Box::new(target),
        }
    }

    /// Attach `target` to the shadow interface `S`
    pub fn of<S: ShadowInterface, T: Any + Send + Sync>(target: T) -> Self {
        let mut facet = Self::new(S::IID, S::NAME, S::vtbl(), target);
        facet.iids.extend_from_slice(S::ALSO);
        facet
    }

    /// Also answer queries for `iid`
    pub fn answers(mut self, iid: Guid) -> Self {
        if !self.iids.contains(&iid) {
            self.iids.push(iid);
        }
        self
    }

    #[inline]
    pub fn iids(&self) -> &[Guid] {
        &self.iids
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ShadowFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowFacet")
            .field("name", &self.name)
            .field("iids", &self.iids)
            .field("vtbl", self.vtbl)
            .finish()
    }
}

/// A registered shadow, as seen from inside a trampoline
#[derive(Clone)]
pub struct ShadowRef {
    container: Arc<ShadowContainer>,
    index: usize,
}

impl ShadowRef {
    /// Shadow whose cell lives at `this`
    ///
    /// `this` is only used as a lookup key, never dereferenced.
    pub fn from_this(this: *mut c_void) -> Result<Self> {
        registry::lookup(this).ok_or(InteropError::ShadowNotFound(this as usize))
    }

    #[inline]
    pub fn container(&self) -> &ShadowContainer {
        &self.container
    }

    /// Primary interface id of this shadow
    #[inline]
    pub fn iid(&self) -> Guid {
        self.container.shadow(self.index).iids[0]
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.container.shadow(self.index).name
    }

    /// Callback target attached to this shadow
    pub fn callback<T: Any>(&self) -> Result<&T> {
        self.container
            .shadow(self.index)
            .target
            .as_deref()
            .and_then(|target| target.downcast_ref::<T>())
            .ok_or(InteropError::CallbackType(any::type_name::<T>()))
    }
}

impl fmt::Debug for ShadowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowRef")
            .field("name", &self.name())
            .field("index", &self.index)
            .finish()
    }
}

/// Run a trampoline body, translating every failure into a status code
///
/// Errors map through `InteropError::result_code`; panics are caught and
/// reported as `E_UNEXPECTED`. Nothing unwinds past this point.
pub fn dispatch<F>(this: *mut c_void, method: &'static str, call: F) -> i32
where
    F: FnOnce(&ShadowRef) -> Result<()>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let shadow = ShadowRef::from_this(this)?;
        call(&shadow)
    }));

    let error = match outcome {
        Ok(Ok(())) => return ResultCode::OK.code(),
        Ok(Err(error)) => error,
        Err(payload) => InteropError::Panic(panic_message(payload.as_ref())),
    };

    let code = error.result_code();
    log_callback_error(method, &error.to_string(), code);
    code.code()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A Rust type that can be handed to foreign code
pub trait Callback: Any + Send + Sync {
    /// Facets to expose; each target usually holds a clone of `self`
    fn shadows(self: Arc<Self>) -> Vec<ShadowFacet>;
}

/// Owning handle to a bound shadow container
///
/// Holds one reference on the shared count. Foreign references taken through
/// the identity slots keep the shadows alive after this handle is dropped.
pub struct CallbackObject {
    container: Arc<ShadowContainer>,
}

impl CallbackObject {
    pub fn new<C: Callback>(callback: Arc<C>) -> Self {
        let facets = Arc::clone(&callback).shadows();
        Self::build(facets, Some(callback as Arc<dyn Any + Send + Sync>))
    }

    /// Object built from explicit facets, with no owning callback
    pub fn from_facets(facets: Vec<ShadowFacet>) -> Self {
        Self::build(facets, None)
    }

    fn build(facets: Vec<ShadowFacet>, owner: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        let container = ShadowContainer::new(facets, owner);
        container.bind();
        Self { container }
    }

    /// Identity address handed to foreign code
    #[inline]
    pub fn identity_ptr(&self) -> *mut c_void {
        self.container.identity()
    }

    /// Vtable cell answering `iid`, without taking a reference
    #[inline]
    pub fn shadow_ptr(&self, iid: &Guid) -> Option<NonNull<c_void>> {
        self.container.find(iid)
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.container.ref_count()
    }

    #[inline]
    pub fn state(&self) -> ShadowState {
        self.container.state()
    }

    /// Number of declared facets, excluding the identity cell
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.container.shadow_count() - 1
    }

    /// The owning callback, if it is a `C`
    pub fn callback<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.container.owner.clone()?.downcast::<C>().ok()
    }

    /// Hand this reference to foreign code
    ///
    /// The registry keeps the container alive until the count reaches zero.
    pub fn into_raw(self) -> *mut c_void {
        let pointer = self.identity_ptr();
        let this = mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once
        drop(unsafe { ptr::read(&this.container) });
        pointer
    }

    /// Take back a reference produced by `into_raw` or a foreign QueryInterface
    ///
    /// # Safety
    /// The caller must own one reference on the container behind `pointer`.
    pub unsafe fn from_raw(pointer: *mut c_void) -> Option<Self> {
        ShadowRef::from_this(pointer).ok().map(|shadow| Self {
            container: shadow.container,
        })
    }
}

impl Unknown for CallbackObject {
    fn query_interface_raw(&self, iid: &Guid) -> Result<NonNull<c_void>> {
        let found = self
            .container
            .find(iid)
            .ok_or_else(|| InteropError::no_interface(*iid))?;
        self.container.add_ref();
        Ok(found)
    }

    fn add_ref(&self) -> u32 {
        self.container.add_ref()
    }

    unsafe fn release(&self) -> u32 {
        self.container.release()
    }
}

impl Clone for CallbackObject {
    fn clone(&self) -> Self {
        self.container.add_ref();
        Self {
            container: Arc::clone(&self.container),
        }
    }
}

impl Drop for CallbackObject {
    fn drop(&mut self) {
        self.container.release();
    }
}

impl fmt::Debug for CallbackObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackObject").field(&*self.container).finish()
    }
}
