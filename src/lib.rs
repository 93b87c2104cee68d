//! vtinterop - reference-counted interop with vtable-based foreign objects
//!
//! Two directions over one binary contract (QueryInterface, AddRef, Release):
//! - `foreign`: wrap objects that live outside Rust and release them exactly once
//! - `shadow`: expose Rust callbacks to foreign code through synthesized vtables

pub mod abi;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod foreign;
pub mod guid;
pub mod interface;
pub mod logging;
pub mod result;
pub mod shadow;

// Re-export core types
pub use config::InteropConfig;
pub use error::{InteropError, Result};
pub use foreign::{ForeignObject, ObjectReference, ObjectTracker};
pub use guid::{Guid, IID_IUNKNOWN};
pub use interface::{Interface, QueryInterfaceManaged, Unknown};
pub use result::ResultCode;
pub use shadow::{Callback, CallbackObject, ShadowFacet, ShadowInterface, Vtbl};

/// Runtime initialization
#[no_mangle]
pub extern "C" fn vtinterop_init() {
    logging::init();
    let config = config::current();
    logging::debug!(?config, "vtinterop initialized");
}

/// Runtime cleanup: reports wrappers that are still alive
#[no_mangle]
pub extern "C" fn vtinterop_cleanup() {
    let report = ObjectTracker::report_live_objects();
    logging::debug!("{}", report.trim_end());
}
