//! Leak diagnostics hook
//!
//! A single process-wide callback receives a formatted warning whenever a
//! live foreign object reaches the finalize path with leak tracking on.
//! Reporting may happen from `Drop`, so the hook is cloned out of the lock
//! before it runs.

use crate::logging::log_leak_warning;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

pub type LeakWarningHook = Arc<dyn Fn(&str) + Send + Sync>;

static LEAK_HOOK: Lazy<RwLock<Option<LeakWarningHook>>> = Lazy::new(|| RwLock::new(None));

/// Install the leak warning callback, replacing any previous one
pub fn set_leak_warning_hook<F>(hook: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    *LEAK_HOOK.write() = Some(Arc::new(hook));
}

/// Remove the leak warning callback
pub fn clear_leak_warning_hook() {
    LEAK_HOOK.write().take();
}

pub fn has_leak_warning_hook() -> bool {
    LEAK_HOOK.read().is_some()
}

/// Log a leak warning and forward it to the hook, if any
pub(crate) fn report_leak(message: &str) {
    log_leak_warning(message);

    let hook = LEAK_HOOK.read().clone();
    if let Some(hook) = hook {
        hook(message);
    }
}
