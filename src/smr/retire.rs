//! Retire records and per-thread retire lists shared by both SMR disciplines.

use std::sync::Mutex;

/// `{raw_ptr, disposer}`, enqueued when a node is logically unlinked and may
/// still be observed by a concurrent reader. Reclaimed only when no hazard
/// slot in any thread references `raw_ptr`.
pub struct RetireEntry {
    pub(crate) ptr: *mut (),
    dispose: Box<dyn FnOnce(*mut ()) + Send>,
}

impl RetireEntry {
    /// Build a retire entry for a `Box<T>`-allocated node, disposing it by
    /// dropping the box. This is the common case for the value-type
    /// adapters in `adapter.rs` and for queue nodes this crate itself
    /// allocates.
    pub fn for_boxed<T>(ptr: *mut T) -> Self {
        RetireEntry {
            ptr: ptr as *mut (),
            dispose: Box::new(move |p| unsafe { drop(Box::from_raw(p as *mut T)) }),
        }
    }

    /// Build a retire entry with a caller-supplied disposer, for intrusive
    /// nodes whose storage is owned by client code (the `Disposer<T>`
    /// contract in `hooks.rs`) rather than allocated by this crate.
    pub fn with_disposer<T>(ptr: *mut T, disposer: fn(*mut T)) -> Self {
        RetireEntry {
            ptr: ptr as *mut (),
            dispose: Box::new(move |p| disposer(p as *mut T)),
        }
    }

    /// Run this entry's disposer immediately, consuming it. Used by
    /// reclamation strategies (such as `NoReclaim`) that never defer
    /// disposal at all.
    pub fn dispose_now(self) {
        (self.dispose)(self.ptr)
    }
}

/// A thread's list of logically-unlinked nodes awaiting safe reclamation.
/// Guarded by a `Mutex` rather than a `RefCell` because `force_dispose` may
/// drain any thread's list from any thread at quiescence.
pub struct RetireList {
    entries: Mutex<Vec<RetireEntry>>,
}

impl Default for RetireList {
    fn default() -> Self {
        RetireList::new()
    }
}

impl RetireList {
    /// A fresh, empty list. `const` so it can back a `static`, matching the
    /// global orphan list in `hazard.rs`/`deferred.rs`.
    pub const fn new() -> Self {
        RetireList { entries: Mutex::new(Vec::new()) }
    }

    /// Remove and return one entry, if any, for hand-off into another
    /// list (used when a thread detaches and orphans its pending retires).
    pub fn pop(&self) -> Option<RetireEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).pop()
    }

    /// Append an entry, returning the list's length after insertion so
    /// callers can compare against `R_MAX`.
    pub fn push(&self, entry: RetireEntry) -> usize {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(entry);
        guard.len()
    }

    /// Drain every entry whose pointer is not present in `protected`,
    /// disposing it; entries still protected are kept for a later scan.
    /// Returns the number disposed.
    pub fn scan_and_reclaim(&self, protected: &[*mut ()]) -> usize {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut disposed = 0;
        let mut kept = Vec::with_capacity(guard.len());
        for entry in guard.drain(..) {
            if protected.contains(&entry.ptr) {
                kept.push(entry);
            } else {
                (entry.dispose)(entry.ptr);
                disposed += 1;
            }
        }
        *guard = kept;
        disposed
    }

    /// Unconditionally dispose every remaining entry. Only safe to call when
    /// quiesced (no thread holds a hazard slot pointing at any of them) —
    /// used by `force_dispose` and by shutdown paths.
    pub fn dispose_all(&self) -> usize {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let n = guard.len();
        for entry in guard.drain(..) {
            (entry.dispose)(entry.ptr);
        }
        n
    }

    /// Current length (approximate outside the lock, exact while held).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// `true` iff there are no pending entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unprotected_entries_are_disposed() {
        static DROPPED: AtomicUsize = AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }
        let list = RetireList::default();
        let raw = Box::into_raw(Box::new(Counted));
        list.push(RetireEntry::for_boxed(raw));
        assert_eq!(list.len(), 1);
        let disposed = list.scan_and_reclaim(&[]);
        assert_eq!(disposed, 1);
        assert_eq!(DROPPED.load(Ordering::Relaxed), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn protected_entries_survive_a_scan() {
        let list = RetireList::default();
        let raw = Box::into_raw(Box::new(42u32));
        list.push(RetireEntry::for_boxed(raw));
        let disposed = list.scan_and_reclaim(&[raw as *mut ()]);
        assert_eq!(disposed, 0);
        assert_eq!(list.len(), 1);
        list.dispose_all();
    }
}
