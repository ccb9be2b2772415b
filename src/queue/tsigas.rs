//! Tsigas & Zhang's bounded lock-free MPMC cycle queue: a fixed-capacity
//! ring of nullable element pointers, with `head`/`tail` cursors advanced
//! as best-effort hints rather than the source of truth for occupancy —
//! each slot's own marker state is what a CAS actually claims. Distinguished
//! from [`super::VyukovMpmcCycleQueue`] by *not* carrying a per-slot
//! sequence number: fullness and emptiness are inferred from the
//! `head`/`tail` distance and from a slot's marker, rather than a
//! precomputed "lap" tag, which is the classic, simpler predecessor design
//! Vyukov's scheme refines.
//!
//! Every slot holds one of three states: [`NULL_MARK`] (never written
//! since construction), [`OLD_MARK`] (written once and since consumed), or
//! a real boxed payload pointer. Both markers are "empty" as far as a
//! producer is concerned — it CASes a slot from either one straight to its
//! payload — but keeping them distinct lets a consumer tell "nothing has
//! ever landed here" apart from "something landed here and I already took
//! it", which is what lets `pop` on a never-written slot at the head
//! distinguish an in-flight write race from a genuinely empty queue instead
//! of conflating the two.
//!
//! Never allocates or frees a node after construction: elements are
//! `Box`-boxed only to fit one per `AtomicPtr` cell, and no safe memory
//! reclamation is needed because a slot is only ever reused in place by the
//! thread that just emptied it.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::atomic::CachePadded;
use crate::backoff::Backoff;
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};

/// Marks a slot that has never held a value since the queue was
/// constructed.
fn null_mark<T>() -> *mut T {
    std::ptr::null_mut()
}

/// Marks a slot that held a value and has since been consumed. Distinct
/// from [`null_mark`] so a dequeuer can tell the two "empty" histories
/// apart; both are valid CAS sources for a producer claiming the slot.
fn old_mark<T>() -> *mut T {
    // A fixed non-null sentinel address no heap allocator ever hands back
    // for a real `Box<T>`, so it can never collide with a genuine payload
    // pointer.
    1usize as *mut T
}

fn is_marker<T>(ptr: *mut T) -> bool {
    ptr == null_mark() || ptr == old_mark()
}

/// A bounded, array-backed multi-producer multi-consumer FIFO. Capacity
/// must be a power of two so slot indexing is a mask, not a modulo.
pub struct TsigasCycleQueue<T> {
    buffer: Box<[AtomicPtr<T>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
}

unsafe impl<T: Send> Send for TsigasCycleQueue<T> {}
unsafe impl<T: Send> Sync for TsigasCycleQueue<T> {}

impl<T> TsigasCycleQueue<T> {
    /// A queue holding at most `capacity` items. `capacity` must be a
    /// power of two.
    pub fn new(capacity: usize) -> Self {
        Self::with_traits(capacity, QueueTraits::default())
    }

    /// Same as [`Self::new`] with an explicit runtime policy.
    pub fn with_traits(capacity: usize, traits: QueueTraits) -> Self {
        assert!(capacity.is_power_of_two(), "TsigasCycleQueue capacity must be a power of two");
        let buffer =
            (0..capacity).map(|_| AtomicPtr::new(null_mark())).collect::<Vec<_>>().into_boxed_slice();
        TsigasCycleQueue {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            traits,
            counters: Counters::new(),
            len: ItemCount::new(),
        }
    }

    /// This queue's fixed capacity.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Resolve `base` against this queue's configured [`MemoryModel`]: see
    /// [`super::MsQueue::ord`].
    #[inline]
    fn ord(&self, base: Ordering) -> Ordering {
        self.traits.memory_model.resolve(base)
    }

    /// Append `value`, returning it back on `Err` if the queue was
    /// observed full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let boxed = Box::into_raw(Box::new(value));
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let t = self.tail.load(self.ord(Ordering::Acquire));
            let h = self.head.load(self.ord(Ordering::Acquire));
            if t.wrapping_sub(h) > self.mask {
                let value = unsafe { *Box::from_raw(boxed) };
                return Err(value);
            }
            let slot = &self.buffer[t & self.mask];
            let cur = slot.load(self.ord(Ordering::Acquire));
            if is_marker(cur) {
                if slot.compare_exchange(cur, boxed, self.ord(Ordering::AcqRel), self.ord(Ordering::Acquire)).is_ok() {
                    let _ = self.tail.compare_exchange(
                        t,
                        t.wrapping_add(1),
                        self.ord(Ordering::Release),
                        self.ord(Ordering::Relaxed),
                    );
                    self.counters.record_push();
                    self.len.inc();
                    return Ok(());
                }
            } else {
                // a write already landed here; tail is lagging behind it.
                let _ = self.tail.compare_exchange(
                    t,
                    t.wrapping_add(1),
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// Remove and return the oldest item, or `None` if the queue was
    /// observed empty.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let h = self.head.load(self.ord(Ordering::Acquire));
            let slot = &self.buffer[h & self.mask];
            let cur = slot.load(self.ord(Ordering::Acquire));
            if cur == null_mark() {
                // nothing has ever landed here; either the queue is
                // genuinely empty at this position or a producer's CAS is
                // still in flight.
                let t = self.tail.load(self.ord(Ordering::Acquire));
                if h == t {
                    self.counters.record_empty_miss();
                    return None;
                }
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if cur == old_mark() {
                // already consumed by a racing dequeuer; head is lagging.
                let _ = self.head.compare_exchange(
                    h,
                    h.wrapping_add(1),
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if slot
                .compare_exchange(cur, old_mark(), self.ord(Ordering::AcqRel), self.ord(Ordering::Acquire))
                .is_ok()
            {
                let _ = self.head.compare_exchange(
                    h,
                    h.wrapping_add(1),
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
                self.counters.record_pop();
                self.len.dec();
                return Some(unsafe { *Box::from_raw(cur) });
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// `true` if no successful `pop` could currently return an item.
    pub fn is_empty(&self) -> bool {
        self.head.load(self.ord(Ordering::Acquire)) == self.tail.load(self.ord(Ordering::Acquire))
    }

    /// Number of items currently in the queue: exact if this queue was
    /// built with [`ItemCounter::Atomic`], else `0`.
    pub fn size(&self) -> usize {
        self.len.get(self.traits.item_counter == ItemCounter::Atomic)
    }

    /// A snapshot of this queue's operation counters.
    pub fn statistics(&self) -> Stats {
        self.counters.snapshot()
    }
}

impl<T> Drop for TsigasCycleQueue<T> {
    fn drop(&mut self) {
        for slot in self.buffer.iter_mut() {
            let p = *slot.get_mut();
            if !is_marker(p) {
                unsafe { drop(Box::from_raw(p)) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_up_to_capacity() {
        let q: TsigasCycleQueue<i32> = TsigasCycleQueue::new(2);
        assert_eq!(q.push(1), Ok(()));
        assert_eq!(q.push(2), Ok(()));
        assert_eq!(q.push(3), Err(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.push(3), Ok(()));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_queue_pops_none() {
        let q: TsigasCycleQueue<i32> = TsigasCycleQueue::new(4);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _q: TsigasCycleQueue<i32> = TsigasCycleQueue::new(3);
    }

    #[test]
    fn a_slot_reused_across_wraparound_distinguishes_never_written_from_consumed() {
        let q: TsigasCycleQueue<i32> = TsigasCycleQueue::new(2);
        assert_eq!(q.push(1), Ok(()));
        assert_eq!(q.pop(), Some(1));
        // the slot just vacated now holds OLD_MARK, not NULL_MARK; a fresh
        // push must still be able to claim it.
        let slot0 = q.buffer[0].load(Ordering::Acquire);
        assert_eq!(slot0, old_mark());
        assert_eq!(q.push(2), Ok(()));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn size_is_zero_unless_item_counter_enabled() {
        let q: TsigasCycleQueue<i32> = TsigasCycleQueue::new(4);
        q.push(1).unwrap();
        assert_eq!(q.size(), 0);

        let q: TsigasCycleQueue<i32> =
            TsigasCycleQueue::with_traits(4, QueueTraits::default().with_item_counter(ItemCounter::Atomic));
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }
}
