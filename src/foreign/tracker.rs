//! Object tracker - registry of live foreign wrappers for leak diagnostics
//!
//! Entries are keyed by wrapper instance id, never by native pointer: two
//! wrappers of one pointer are two entries. All operations are safe to run
//! from `Drop` on any thread.
//!
//! Thread-local tracking scopes entries to the wrapper's creating thread.
//! They live in one shared map keyed by that thread, so a wrapper dropped
//! elsewhere still removes its own entry.

use super::ForeignObject;
use crate::logging::log_live_objects;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::panic::Location;
use std::thread::{self, ThreadId};

/// Process-wide registry (concurrent map)
static LIVE: Lazy<DashMap<u64, ObjectReference>> = Lazy::new(|| DashMap::with_capacity(64));

/// Per-thread entries, keyed by (creating thread, wrapper id)
static THREAD_LIVE: Lazy<DashMap<(ThreadId, u64), ObjectReference>> =
    Lazy::new(|| DashMap::with_capacity(64));

/// Lightweight description of a tracked wrapper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectReference {
    /// Wrapper instance id, 0 when not found
    pub id: u64,
    pub pointer: usize,
    pub type_name: &'static str,
    /// Where the wrapper was created
    pub location: Option<&'static Location<'static>>,
}

impl ObjectReference {
    #[inline]
    pub fn is_found(&self) -> bool {
        self.id != 0
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_found() {
            return f.write_str("<untracked>");
        }
        write!(f, "{}#{} [0x{:X}]", self.type_name, self.id, self.pointer)?;
        if let Some(location) = self.location {
            write!(f, " created at {}", location)?;
        }
        Ok(())
    }
}

pub struct ObjectTracker;

impl ObjectTracker {
    /// Register `object`, replacing any previous entry for the same instance
    pub fn track(object: &ForeignObject) {
        let reference = object.describe();
        if object.config().thread_local_tracking {
            THREAD_LIVE.insert((object.thread(), reference.id), reference);
        } else {
            LIVE.insert(reference.id, reference);
        }
    }

    /// Remove `object`; no-op if it was never tracked
    pub fn untrack(object: &ForeignObject) {
        if object.config().thread_local_tracking {
            THREAD_LIVE.remove(&(object.thread(), object.id()));
        } else {
            LIVE.remove(&object.id());
        }
    }

    /// Tracked description of `object`, or the default when absent
    pub fn find(object: &ForeignObject) -> ObjectReference {
        let entry = if object.config().thread_local_tracking {
            THREAD_LIVE
                .get(&(object.thread(), object.id()))
                .map(|entry| entry.value().clone())
        } else {
            LIVE.get(&object.id()).map(|entry| entry.value().clone())
        };
        entry.unwrap_or_default()
    }

    /// Snapshot of process-wide entries plus this thread's entries, oldest first
    pub fn live_objects() -> Vec<ObjectReference> {
        let current = thread::current().id();
        let mut objects: Vec<ObjectReference> =
            LIVE.iter().map(|entry| entry.value().clone()).collect();

        objects.extend(
            THREAD_LIVE
                .iter()
                .filter(|entry| entry.key().0 == current)
                .map(|entry| entry.value().clone()),
        );

        objects.sort_by_key(|reference| reference.id);
        objects
    }

    /// Human-readable report of live objects, one per line
    pub fn report_live_objects() -> String {
        let objects = Self::live_objects();
        log_live_objects(objects.len());

        let mut report = format!("{} live foreign object(s)\n", objects.len());
        for reference in &objects {
            report.push_str("  ");
            report.push_str(&reference.to_string());
            report.push('\n');
        }
        report
    }
}
