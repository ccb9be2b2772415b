//! Hazard Pointers (L3a): a fixed per-thread slot array published before
//! every dereference of a potentially-retired node.
//!
//! Grounded on `concurrent::skiplist`'s `HazardPointer`/`HazardGuard` pair
//! (a thread-local fixed-size slot array, `protect`/`clear`) and on
//! `other_examples/Lol3rrr-nolock`'s `hazard_ptr::domain` (`retire_node`,
//! `scan`, a global registry of per-thread protected sets checked against a
//! retire list). This module fuses the two: skiplist's slot-array shape,
//! domain's cross-thread scan/orphan-list discipline.
//!
//! The thread-local registry entry is created lazily on first touch, but it
//! starts inactive: `pin()` panics via `thread_not_attached()` until the
//! calling thread has called `attach()`, so a thread that never attaches
//! cannot silently publish hazards that a concurrent `scan()` would ignore.

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use super::retire::{RetireEntry, RetireList};
use super::{Reclaim, ReclaimGuard};
use crate::error::{hazard_slot_exhausted, thread_not_attached};

/// Hazard slots published per guard scope. The Ellen tree's `search` is the
/// deepest user: rather than rotate a fixed 2-slot ancestor window (which
/// would need an array-index-addressable protect, not just the
/// checkpoint/rewind this crate's `protect`/`rewind` pair supports without
/// a transient unprotected gap), `search` simply protects one node per
/// level descended and keeps all of them until it returns the
/// {grandparent, parent, leaf} triple the caller needs. That bounds a
/// single `search` call to trees no deeper than `HAZARD_COUNT`, which is
/// why this is sized well past `skiplist::HAZARD_POINTERS`'s eight-slot
/// array rather than matching it outright; see DESIGN.md. Queues still use
/// at most 2-3 slots per operation.
pub const HAZARD_COUNT: usize = 48;

struct ThreadContext {
    slots: [AtomicPtr<()>; HAZARD_COUNT],
    retire_list: RetireList,
    pin_count: Cell<usize>,
    next_slot: Cell<usize>,
    active: AtomicBool,
    next: AtomicPtr<ThreadContext>,
}

impl ThreadContext {
    fn register() -> &'static ThreadContext {
        let ctx = Box::leak(Box::new(ThreadContext {
            slots: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            retire_list: RetireList::default(),
            pin_count: Cell::new(0),
            next_slot: Cell::new(0),
            active: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        loop {
            let head = PARTICIPANTS.load(Ordering::Acquire);
            ctx.next.store(head, Ordering::Relaxed);
            if PARTICIPANTS
                .compare_exchange(head, ctx, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        ctx
    }
}

static PARTICIPANTS: AtomicPtr<ThreadContext> = AtomicPtr::new(ptr::null_mut());
static ORPHANED: RetireList = RetireList::new();

struct ContextHandle {
    ctx: &'static ThreadContext,
}

impl ContextHandle {
    fn new() -> Self {
        ContextHandle { ctx: ThreadContext::register() }
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        for slot in &self.ctx.slots {
            slot.store(ptr::null_mut(), Ordering::Release);
        }
        if self.ctx.active.swap(false, Ordering::AcqRel) {
            orphan_retire_list(&self.ctx.retire_list);
            super::thread_detached();
        }
    }
}

fn orphan_retire_list(list: &RetireList) {
    while let Some(entry) = list.pop() {
        ORPHANED.push(entry);
    }
}

thread_local! {
    static CONTEXT: ContextHandle = ContextHandle::new();
}

fn with_context<R>(f: impl FnOnce(&'static ThreadContext) -> R) -> R {
    CONTEXT.with(|handle| f(handle.ctx))
}

fn protected_pointers() -> Vec<*mut ()> {
    let mut out = Vec::new();
    let mut cur = PARTICIPANTS.load(Ordering::Acquire);
    while !cur.is_null() {
        let ctx = unsafe { &*cur };
        if ctx.active.load(Ordering::Acquire) {
            for slot in &ctx.slots {
                let p = slot.load(Ordering::Acquire);
                if !p.is_null() {
                    out.push(p);
                }
            }
        }
        cur = ctx.next.load(Ordering::Acquire);
    }
    out
}

fn scan() {
    let protected = protected_pointers();
    with_context(|ctx| {
        ctx.retire_list.scan_and_reclaim(&protected);
    });
    ORPHANED.scan_and_reclaim(&protected);
}

/// The hazard-pointer `Reclaim` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct HazardPointer;

/// A pinned scope over the calling thread's hazard slots.
pub struct HazardGuard {
    ctx: &'static ThreadContext,
}

impl Reclaim for HazardPointer {
    type Guard = HazardGuard;

    fn pin() -> Self::Guard {
        with_context(|ctx| {
            if !ctx.active.load(Ordering::Acquire) {
                thread_not_attached();
            }
            let was_unpinned = ctx.pin_count.get() == 0;
            ctx.pin_count.set(ctx.pin_count.get() + 1);
            if was_unpinned {
                ctx.next_slot.set(0);
            }
            HazardGuard { ctx }
        })
    }

    fn attach() {
        with_context(|ctx| {
            if !ctx.active.swap(true, Ordering::AcqRel) {
                super::thread_attached();
            }
        });
    }

    fn detach() {
        with_context(|ctx| {
            if ctx.active.swap(false, Ordering::AcqRel) {
                orphan_retire_list(&ctx.retire_list);
                super::thread_detached();
            }
        });
    }

    fn force_dispose() {
        let mut cur = PARTICIPANTS.load(Ordering::Acquire);
        while !cur.is_null() {
            let ctx = unsafe { &*cur };
            ctx.retire_list.dispose_all();
            cur = ctx.next.load(Ordering::Acquire);
        }
        ORPHANED.dispose_all();
    }
}

impl ReclaimGuard for HazardGuard {
    fn protect<T>(&self, atomic: &AtomicPtr<T>) -> *mut T {
        let idx = self.ctx.next_slot.get();
        if idx >= HAZARD_COUNT {
            hazard_slot_exhausted();
        }
        self.ctx.next_slot.set(idx + 1);
        let p = atomic.load(Ordering::Acquire);
        self.ctx.slots[idx].store(p as *mut (), Ordering::Release);
        p
    }

    fn protect_raw<T>(&self, ptr: *mut T) {
        let idx = self.ctx.next_slot.get();
        if idx >= HAZARD_COUNT {
            hazard_slot_exhausted();
        }
        self.ctx.next_slot.set(idx + 1);
        self.ctx.slots[idx].store(ptr as *mut (), Ordering::Release);
    }

    fn retire(&self, entry: RetireEntry) {
        let len = self.ctx.retire_list.push(entry);
        if len >= super::r_max(HAZARD_COUNT) {
            scan();
        }
    }

    fn checkpoint(&self) -> usize {
        self.ctx.next_slot.get()
    }

    fn rewind(&self, checkpoint: usize) {
        let current = self.ctx.next_slot.get();
        for slot in &self.ctx.slots[checkpoint..current] {
            slot.store(ptr::null_mut(), Ordering::Release);
        }
        self.ctx.next_slot.set(checkpoint);
    }
}

impl Drop for HazardGuard {
    fn drop(&mut self) {
        let remaining = self.ctx.pin_count.get() - 1;
        self.ctx.pin_count.set(remaining);
        if remaining == 0 {
            for slot in &self.ctx.slots {
                slot.store(ptr::null_mut(), Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn protect_then_unpin_clears_the_slot() {
        HazardPointer::attach();
        let mut v = 1u32;
        let atomic = AtomicPtr::new(&mut v as *mut u32);
        {
            let guard = HazardPointer::pin();
            let p = guard.protect(&atomic);
            assert_eq!(p, &mut v as *mut u32);
        }
        // after the guard drops, a fresh scan should find nothing protected
        // in this thread's slots.
        with_context(|ctx| {
            assert!(ctx.slots.iter().all(|s| s.load(Ordering::Acquire).is_null()));
        });
    }

    #[test]
    fn retire_without_readers_is_eventually_reclaimed() {
        HazardPointer::attach();
        static DROPPED: AtomicUsize = AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }
        let raw = Box::into_raw(Box::new(Counted));
        {
            let guard = HazardPointer::pin();
            guard.retire(RetireEntry::for_boxed(raw));
        }
        scan();
        assert_eq!(DROPPED.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn rewind_reuses_the_checkpointed_slot() {
        HazardPointer::attach();
        let mut a = 1u32;
        let mut b = 2u32;
        let atomic_a = AtomicPtr::new(&mut a as *mut u32);
        let atomic_b = AtomicPtr::new(&mut b as *mut u32);
        let guard = HazardPointer::pin();
        let checkpoint = guard.checkpoint();
        let _pa = guard.protect(&atomic_a);
        guard.rewind(checkpoint);
        // the slot consumed protecting `a` must be free again, so
        // protecting `b` lands in the very same index rather than a fresh
        // one further down the array.
        let _pb = guard.protect(&atomic_b);
        assert_eq!(guard.checkpoint(), checkpoint + 1);
    }

    #[test]
    fn nested_pins_do_not_clear_the_outer_scopes_slots() {
        HazardPointer::attach();
        let mut v = 1u32;
        let atomic = AtomicPtr::new(&mut v as *mut u32);
        let outer = HazardPointer::pin();
        let _p0 = outer.protect(&atomic);
        {
            let inner = HazardPointer::pin();
            let _p1 = inner.protect(&atomic);
        }
        // the outer guard's slot must still be intact after the inner
        // guard's drop, since pin_count has not reached zero yet.
        with_context(|ctx| {
            assert!(ctx.slots[0].load(Ordering::Acquire) == &mut v as *mut u32 as *mut ());
        });
    }
}
