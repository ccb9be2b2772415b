//! Pluggable safe memory reclamation (L2/L3a/L3b).
//!
//! Every queue and the Ellen tree is generic over a [`Reclaim`] strategy so
//! the same traversal/CAS code runs unchanged whether hazard pointers,
//! deferred (epoch) reclamation, or no reclamation at all backs it. This
//! mirrors how the Ellen tree's source ships a `_nogc` variant
//! (`ellen_bintree_nogc.h`) alongside its hazard-pointer and epoch-backed
//! siblings: reclamation strategy is a policy, not part of the algorithm.

mod deferred;
mod hazard;
#[cfg(loom)]
mod loom_tests;
mod retire;

pub use deferred::{DeferredGuard, DeferredHazard};
pub use hazard::{HazardGuard, HazardPointer};
pub use retire::RetireEntry;

use std::sync::atomic::{AtomicUsize, Ordering};

/// Count of currently-attached threads across every [`Reclaim`] strategy in
/// the process. Feeds the shared `R_MAX` sizing formula so the reclamation
/// threshold scales with observed parallelism instead of a fixed constant.
static ATTACHED_THREADS: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn thread_attached() -> usize {
    ATTACHED_THREADS.fetch_add(1, Ordering::Relaxed) + 1
}

pub(crate) fn thread_detached() {
    ATTACHED_THREADS.fetch_sub(1, Ordering::Relaxed);
}

/// `R_MAX = 64 + 2 * hazards_per_guard * attached_threads`, the retire-list
/// length that triggers an eager `scan()`. Scaling with the live thread
/// count keeps a scan's protected-set comparison cheap relative to the
/// number of entries it can reclaim.
pub(crate) fn r_max(hazards_per_guard: usize) -> usize {
    let threads = ATTACHED_THREADS.load(Ordering::Relaxed).max(1);
    64 + 2 * hazards_per_guard * threads
}

/// A pluggable safe-memory-reclamation strategy. Implementors are
/// zero-sized marker types; all state lives behind thread-local/static
/// registries inside the implementation module, following the shape of
/// `concurrent::epoch::Guard::pin()` generalized to more than one scheme.
pub trait Reclaim: 'static {
    /// The guard type returned by [`Reclaim::pin`], scoping how long any
    /// pointer obtained through it remains safe to dereference.
    type Guard: ReclaimGuard;

    /// Enter a protected scope. Reentrant: nested `pin()` calls on the same
    /// thread compose rather than deadlock or double-register.
    fn pin() -> Self::Guard;

    /// Register the calling thread with this strategy's registry. Queue and
    /// tree constructors call this on first use per thread; it is cheap to
    /// call redundantly.
    fn attach();

    /// Unregister the calling thread. Any retire entries it still owns are
    /// hazard to any thread's future scan until reassigned, so structures
    /// should call this only when truly done with the structure.
    fn detach();

    /// Drain every attached thread's retire list unconditionally, ignoring
    /// protection. Only sound to call when the caller can prove no thread
    /// holds a live reference into the structure (typically: during
    /// quiescent shutdown in `Drop`).
    fn force_dispose();
}

/// The scope-local capability a [`Reclaim`] strategy's `pin()` returns:
/// publish a hazard for a loaded pointer, and hand off a node for deferred
/// disposal once no hazard references it.
pub trait ReclaimGuard {
    /// Load `atomic` and publish the result as protected for the lifetime of
    /// this guard. This is the load-then-publish half of the
    /// protect/reload/verify cycle every hazard-protected dereference must
    /// go through; the reload-and-verify half is the caller's own CAS retry
    /// loop, the same way the classic Michael & Scott queue interleaves it.
    fn protect<T>(&self, atomic: &std::sync::atomic::AtomicPtr<T>) -> *mut T;

    /// Publish an already-loaded, non-null pointer as protected without a
    /// fresh load, for the case where the caller obtained `ptr` from a CAS's
    /// return value rather than a plain load.
    fn protect_raw<T>(&self, ptr: *mut T);

    /// Hand `entry` to the reclamation registry. It is disposed once a scan
    /// observes no thread's hazard slots reference its pointer.
    fn retire(&self, entry: RetireEntry);

    /// A marker for the guard's current protection-slot cursor. Lets a
    /// caller that walks a structure deeper than its protections need to
    /// stay live (a tree descent, where only the last couple of ancestors
    /// plus the leaf matter) release the oldest protection and reuse its
    /// slot via [`ReclaimGuard::rewind`], instead of consuming one slot per
    /// level visited. [`HazardGuard`] and [`DeferredGuard`] both back this
    /// with a real per-pointer slot cursor (a fixed per-thread array and a
    /// shared on-demand pool, respectively); [`NoReclaimGuard`] protects
    /// nothing and returns a meaningless constant.
    fn checkpoint(&self) -> usize {
        0
    }

    /// Release every protection published since `checkpoint`, and reset the
    /// slot cursor so the next `protect`/`protect_raw` call reuses that
    /// slot. See [`ReclaimGuard::checkpoint`].
    fn rewind(&self, _checkpoint: usize) {}
}

/// The `_nogc` strategy: no protection is published and `retire` disposes
/// immediately. Only sound when the caller can guarantee no other thread
/// ever observes a pointer after it is retired — single-threaded use,
/// benchmarking baselines, and loom-model exhaustive checks where the model
/// checker itself enforces quiescence. Grounded on
/// `original_source/cds/intrusive/ellen_bintree_nogc.h`, the reclamation-free
/// sibling of the hazard-pointer and epoch-backed tree variants.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReclaim;

/// The trivial guard for [`NoReclaim`]: protection is a no-op and retirement
/// disposes synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReclaimGuard;

impl Reclaim for NoReclaim {
    type Guard = NoReclaimGuard;

    fn pin() -> Self::Guard {
        NoReclaimGuard
    }

    fn attach() {}
    fn detach() {}
    fn force_dispose() {}
}

impl ReclaimGuard for NoReclaimGuard {
    fn protect<T>(&self, atomic: &std::sync::atomic::AtomicPtr<T>) -> *mut T {
        atomic.load(std::sync::atomic::Ordering::Acquire)
    }

    fn protect_raw<T>(&self, _ptr: *mut T) {}

    fn retire(&self, entry: RetireEntry) {
        entry.dispose_now();
    }
}

/// A client-visible handle pinning a single extracted value for as long as
/// the handle lives. [`crate::tree::EllenTree::get`]/
/// `extract`/`extract_min`/`extract_max` return one of these instead of a
/// bare reference: the [`Reclaim::Guard`] it carries keeps the owning
/// node's hazard/epoch protection alive, so the pointee cannot be disposed
/// out from under the caller even if a concurrent `erase` unlinks it the
/// instant after `get` returns. There is deliberately no separate
/// `ExemptPtr` type for the epoch discipline: the same `GuardedPtr<T, R>`
/// serves both, generic over whichever `Reclaim::Guard` `R` supplies,
/// because the two strategies already differ only in what `Guard` does on
/// drop (clear hazard slots vs. let the epoch advance) -- see DESIGN.md.
pub struct GuardedPtr<T, R: Reclaim> {
    guard: R::Guard,
    ptr: *const T,
}

impl<T, R: Reclaim> GuardedPtr<T, R> {
    /// Build a guarded pointer from a guard already protecting `ptr`.
    /// Callers must ensure `ptr` was published into `guard`'s protection
    /// (via `protect`/`protect_raw`) before constructing this, and that
    /// `ptr` stays valid to dereference for as long as the guard is held.
    pub(crate) fn new(guard: R::Guard, ptr: *const T) -> Self {
        GuardedPtr { guard, ptr }
    }
}

impl<T, R: Reclaim> std::ops::Deref for GuardedPtr<T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `guard` (held for the lifetime of `self`) protects `ptr`
        // against reclamation, per the invariant established in `new`.
        unsafe { &*self.ptr }
    }
}

// The guard itself carries whatever Send/Sync the reclamation scheme
// allows; `ptr` is read-only and never aliases mutable access once
// published, so this is sound whenever `T` would be for a shared reference.
unsafe impl<T: Sync, R: Reclaim> Send for GuardedPtr<T, R> where R::Guard: Send {}
unsafe impl<T: Sync, R: Reclaim> Sync for GuardedPtr<T, R> where R::Guard: Sync {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicPtr, Ordering};

    #[test]
    fn no_reclaim_protect_reads_through() {
        let mut value = 7u32;
        let atomic = AtomicPtr::new(&mut value as *mut u32);
        let guard = NoReclaim::pin();
        let p = guard.protect(&atomic);
        assert_eq!(p, atomic.load(Ordering::Acquire));
    }

    #[test]
    fn r_max_scales_with_threads() {
        let before = r_max(4);
        thread_attached();
        thread_attached();
        let after = r_max(4);
        assert!(after >= before);
        thread_detached();
        thread_detached();
    }
}
