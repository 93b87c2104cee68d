//! Interface negotiation - the QueryInterface protocol from the host side
//!
//! `Unknown` is the identity contract every foreign-compatible object
//! exposes. It is implemented twice: by `ForeignObject`, which forwards to the
//! native vtable, and by `CallbackObject`, which answers from its declared
//! shadows. `QueryInterfaceManaged` layers typed queries on top of either.

use crate::config::{self, InteropConfig};
use crate::error::Result;
use crate::foreign::{self, ForeignObject};
use crate::guid::Guid;
use core::ffi::c_void;
use core::ptr::{self, NonNull};

/// Identity and reference counting contract
pub trait Unknown {
    /// Query for `iid`; on success the returned pointer carries a new reference
    fn query_interface_raw(&self, iid: &Guid) -> Result<NonNull<c_void>>;

    /// Query for `iid`, returning null instead of an error
    fn query_interface_raw_or_null(&self, iid: &Guid) -> *mut c_void {
        self.query_interface_raw(iid)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    fn add_ref(&self) -> u32;

    /// # Safety
    /// The caller must own the reference being released.
    unsafe fn release(&self) -> u32;

    /// Configuration handed to wrappers created by queries
    fn config(&self) -> InteropConfig {
        config::current()
    }
}

/// Typed view of a foreign object for one interface
pub trait Interface: Sized {
    const IID: Guid;
    const NAME: &'static str;

    /// Wrap an object already known to implement this interface
    fn from_object(object: ForeignObject) -> Self;

    fn as_object(&self) -> &ForeignObject;

    fn into_object(self) -> ForeignObject;
}

/// Typed QueryInterface for host code
pub trait QueryInterfaceManaged {
    /// Query for `T`, failing with `NoInterface` if unsupported
    fn query_interface<T: Interface>(&self) -> Result<T>;

    /// Query for `T`, `None` if unsupported
    fn query_interface_or_null<T: Interface>(&self) -> Option<T>;
}

impl<U: Unknown + ?Sized> QueryInterfaceManaged for U {
    #[track_caller]
    fn query_interface<T: Interface>(&self) -> Result<T> {
        let pointer = self.query_interface_raw(&T::IID)?;
        // SAFETY: a successful query hands us a fresh reference, adopted without AddRef
        let object = unsafe { ForeignObject::adopt(pointer.as_ptr(), T::NAME, self.config()) };
        Ok(T::from_object(object))
    }

    #[track_caller]
    fn query_interface_or_null<T: Interface>(&self) -> Option<T> {
        let pointer = self.query_interface_raw(&T::IID).ok()?;
        // SAFETY: as above
        let object = unsafe { ForeignObject::adopt(pointer.as_ptr(), T::NAME, self.config()) };
        Some(T::from_object(object))
    }
}

/// Compare two optional wrappers by native pointer; `None` equals a null wrapper
pub fn equals_foreign<T: Interface>(left: Option<&T>, right: Option<&T>) -> bool {
    let pointer = |object: Option<&T>| {
        object.map_or(ptr::null_mut(), |object| object.as_object().native_pointer())
    };
    pointer(left) == pointer(right)
}

/// Query a borrowed raw pointer for `T`
///
/// The caller's own reference is left untouched; the returned wrapper owns
/// the new reference produced by the query.
///
/// # Safety
/// `pointer` must be null or a live foreign object.
#[track_caller]
pub unsafe fn cast<T: Interface>(pointer: *mut c_void) -> Result<T> {
    let object = foreign::query_raw(pointer, &T::IID)?;
    Ok(T::from_object(ForeignObject::adopt(
        object.as_ptr(),
        T::NAME,
        config::current(),
    )))
}

/// Like `cast`, but `None` for a null pointer or an unsupported interface
///
/// # Safety
/// Same as `cast`.
#[track_caller]
pub unsafe fn cast_or_null<T: Interface>(pointer: *mut c_void) -> Option<T> {
    cast(pointer).ok()
}

/// Declare a typed wrapper around `ForeignObject` for one interface
///
/// ```ignore
/// foreign_interface! {
///     /// Byte stream
///     pub struct SequentialStream = IID_SEQUENTIAL_STREAM, "ISequentialStream";
/// }
/// ```
#[macro_export]
macro_rules! foreign_interface {
    ($(#[$meta:meta])* $vis:vis struct $name:ident = $iid:expr, $label:literal;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis struct $name($crate::foreign::ForeignObject);

        impl $crate::interface::Interface for $name {
            const IID: $crate::guid::Guid = $iid;
            const NAME: &'static str = $label;

            fn from_object(object: $crate::foreign::ForeignObject) -> Self {
                Self(object)
            }

            fn as_object(&self) -> &$crate::foreign::ForeignObject {
                &self.0
            }

            fn into_object(self) -> $crate::foreign::ForeignObject {
                self.0
            }
        }

        impl ::core::ops::Deref for $name {
            type Target = $crate::foreign::ForeignObject;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}
