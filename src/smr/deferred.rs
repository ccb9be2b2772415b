//! Deferred Hazard Pointers (DHP, L3b): a shared pool of hazard slots
//! allocated on demand instead of hazard.rs's fixed per-thread array.
//! Clients acquire a guard which leases a slot from the pool per
//! protected pointer; on scope exit (or explicit `rewind`) the slot is
//! returned to the pool for any thread to lease next. This trades a
//! per-protection atomic CAS over the pool for unbounded per-thread
//! protection counts — no `HAZARD_COUNT`-style ceiling per guard.
//!
//! Grounded on `hazard.rs`'s `ThreadContext`/`HazardGuard` shape
//! (thread-local registry, `protect`/`retire`/`scan`, orphaned-list
//! draining on detach) generalized from a fixed per-thread slot array to
//! a dynamically-growing chunked pool shared by every thread: `acquire_slot`
//! walks the pool's chunks trying to lease a free slot and allocates a new
//! chunk only when none is free, `scan_pool` replaces `protected_pointers`
//! by iterating every leased slot across every chunk rather than every
//! thread's fixed array. Reclamation scan is otherwise identical in
//! principle to hazard.rs's `scan()`.

use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use super::retire::{RetireEntry, RetireList};
use super::{Reclaim, ReclaimGuard};
use crate::error::thread_not_attached;

/// Slots allocated per pool chunk; a new chunk is linked in only once every
/// existing chunk's slots are leased.
const POOL_CHUNK_SIZE: usize = 64;

struct PoolSlot {
    value: AtomicPtr<()>,
    leased: AtomicBool,
}

struct Chunk {
    slots: [PoolSlot; POOL_CHUNK_SIZE],
    next: AtomicPtr<Chunk>,
}

static POOL_HEAD: AtomicPtr<Chunk> = AtomicPtr::new(ptr::null_mut());

/// Allocate a new chunk with its first slot pre-leased (to the caller that
/// triggered the allocation) and link it at the pool's head.
fn new_chunk_with_first_leased() -> &'static Chunk {
    let chunk = Box::leak(Box::new(Chunk {
        slots: std::array::from_fn(|i| PoolSlot {
            value: AtomicPtr::new(ptr::null_mut()),
            leased: AtomicBool::new(i == 0),
        }),
        next: AtomicPtr::new(ptr::null_mut()),
    }));
    loop {
        let head = POOL_HEAD.load(Ordering::Acquire);
        chunk.next.store(head, Ordering::Relaxed);
        if POOL_HEAD
            .compare_exchange(head, chunk, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
    chunk
}

fn acquire_slot() -> &'static PoolSlot {
    let mut cur = POOL_HEAD.load(Ordering::Acquire);
    while !cur.is_null() {
        let chunk = unsafe { &*cur };
        for slot in &chunk.slots {
            if slot
                .leased
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return slot;
            }
        }
        cur = chunk.next.load(Ordering::Acquire);
    }
    &new_chunk_with_first_leased().slots[0]
}

fn release_slot(slot: &'static PoolSlot) {
    slot.value.store(ptr::null_mut(), Ordering::Release);
    slot.leased.store(false, Ordering::Release);
}

fn scan_pool() -> Vec<*mut ()> {
    let mut out = Vec::new();
    let mut cur = POOL_HEAD.load(Ordering::Acquire);
    while !cur.is_null() {
        let chunk = unsafe { &*cur };
        for slot in &chunk.slots {
            if slot.leased.load(Ordering::Acquire) {
                let p = slot.value.load(Ordering::Acquire);
                if !p.is_null() {
                    out.push(p);
                }
            }
        }
        cur = chunk.next.load(Ordering::Acquire);
    }
    out
}

struct Participant {
    retire_list: RetireList,
    leased: RefCell<Vec<&'static PoolSlot>>,
    pin_count: Cell<usize>,
    active: AtomicBool,
    next: AtomicPtr<Participant>,
}

impl Participant {
    fn register() -> &'static Participant {
        let p = Box::leak(Box::new(Participant {
            retire_list: RetireList::default(),
            leased: RefCell::new(Vec::new()),
            pin_count: Cell::new(0),
            active: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        loop {
            let head = PARTICIPANTS.load(Ordering::Acquire);
            p.next.store(head, Ordering::Relaxed);
            if PARTICIPANTS
                .compare_exchange(head, p, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        p
    }
}

static PARTICIPANTS: AtomicPtr<Participant> = AtomicPtr::new(ptr::null_mut());
static ORPHANED: RetireList = RetireList::new();

struct ParticipantHandle {
    p: &'static Participant,
}

impl ParticipantHandle {
    fn new() -> Self {
        ParticipantHandle { p: Participant::register() }
    }
}

impl Drop for ParticipantHandle {
    fn drop(&mut self) {
        for slot in self.p.leased.borrow_mut().drain(..) {
            release_slot(slot);
        }
        if self.p.active.swap(false, Ordering::AcqRel) {
            orphan_retire_list(&self.p.retire_list);
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
    static PARTICIPANT: ParticipantHandle = ParticipantHandle::new();
}

fn with_participant<R>(f: impl FnOnce(&'static Participant) -> R) -> R {
    PARTICIPANT.with(|handle| f(handle.p))
}

fn scan() {
    let protected = scan_pool();
    with_participant(|p| {
        p.retire_list.scan_and_reclaim(&protected);
    });
    ORPHANED.scan_and_reclaim(&protected);
}

/// The pooled-hazard-slot `Reclaim` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredHazard;

/// A pinned scope leasing pool slots on demand.
pub struct DeferredGuard {
    p: &'static Participant,
}

impl Reclaim for DeferredHazard {
    type Guard = DeferredGuard;

    fn pin() -> Self::Guard {
        with_participant(|p| {
            if !p.active.load(Ordering::Acquire) {
                thread_not_attached();
            }
            p.pin_count.set(p.pin_count.get() + 1);
            DeferredGuard { p }
        })
    }

    fn attach() {
        with_participant(|p| {
            if !p.active.swap(true, Ordering::AcqRel) {
                super::thread_attached();
            }
        });
    }

    fn detach() {
        with_participant(|p| {
            if p.active.swap(false, Ordering::AcqRel) {
                orphan_retire_list(&p.retire_list);
                super::thread_detached();
            }
        });
    }

    fn force_dispose() {
        let mut cur = PARTICIPANTS.load(Ordering::Acquire);
        while !cur.is_null() {
            let p = unsafe { &*cur };
            p.retire_list.dispose_all();
            cur = p.next.load(Ordering::Acquire);
        }
        ORPHANED.dispose_all();
    }
}

impl ReclaimGuard for DeferredGuard {
    fn protect<T>(&self, atomic: &AtomicPtr<T>) -> *mut T {
        let slot = acquire_slot();
        let p = atomic.load(Ordering::Acquire);
        slot.value.store(p as *mut (), Ordering::Release);
        self.p.leased.borrow_mut().push(slot);
        p
    }

    fn protect_raw<T>(&self, ptr: *mut T) {
        let slot = acquire_slot();
        slot.value.store(ptr as *mut (), Ordering::Release);
        self.p.leased.borrow_mut().push(slot);
    }

    fn retire(&self, entry: RetireEntry) {
        let len = self.p.retire_list.push(entry);
        if len >= super::r_max(POOL_CHUNK_SIZE) {
            scan();
        }
    }

    fn checkpoint(&self) -> usize {
        self.p.leased.borrow().len()
    }

    fn rewind(&self, checkpoint: usize) {
        let mut leased = self.p.leased.borrow_mut();
        for slot in leased.drain(checkpoint..) {
            release_slot(slot);
        }
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let remaining = self.p.pin_count.get() - 1;
        self.p.pin_count.set(remaining);
        if remaining == 0 {
            let mut leased = self.p.leased.borrow_mut();
            for slot in leased.drain(..) {
                release_slot(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn protect_leases_a_pool_slot_that_publishes_the_pointer() {
        DeferredHazard::attach();
        let mut v = 9u32;
        let atomic = AtomicPtr::new(&mut v as *mut u32);
        let guard = DeferredHazard::pin();
        let p = guard.protect(&atomic);
        assert_eq!(p, &mut v as *mut u32);
        assert!(scan_pool().contains(&(p as *mut ())));
    }

    #[test]
    fn rewind_releases_the_checkpointed_slot_back_to_the_pool() {
        DeferredHazard::attach();
        let mut a = 1u32;
        let mut b = 2u32;
        let atomic_a = AtomicPtr::new(&mut a as *mut u32);
        let atomic_b = AtomicPtr::new(&mut b as *mut u32);
        let guard = DeferredHazard::pin();
        let checkpoint = guard.checkpoint();
        let _pa = guard.protect(&atomic_a);
        guard.rewind(checkpoint);
        // the slot consumed protecting `a` must be free again, so
        // protecting `b` lands back at the same checkpoint rather than
        // leasing a fresh slot on top of it.
        let _pb = guard.protect(&atomic_b);
        assert_eq!(guard.checkpoint(), checkpoint + 1);
    }

    #[test]
    fn retired_nodes_are_eventually_collected() {
        DeferredHazard::attach();
        static DROPPED: AtomicUsize = AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }
        let raw = Box::into_raw(Box::new(Counted));
        {
            let guard = DeferredHazard::pin();
            guard.retire(RetireEntry::for_boxed(raw));
        }
        scan();
        assert_eq!(DROPPED.load(Ordering::Relaxed), 1);
    }
}
