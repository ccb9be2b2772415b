//! Vyukov's bounded MPMC ring buffer: each cell carries its own sequence
//! number, so a producer or consumer can tell at a glance which "lap"
//! around the ring a cell currently belongs to instead of inferring
//! occupancy from a head/tail distance the way [`super::TsigasCycleQueue`]
//! does. Capacity must be a power of two so a slot index is a plain mask
//! rather than a modulo.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::atomic::CachePadded;
use crate::backoff::Backoff;
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};

struct Cell<T> {
    sequence: AtomicUsize,
    data: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded, power-of-two-capacity multi-producer multi-consumer FIFO.
pub struct VyukovMpmcCycleQueue<T> {
    buffer: Box<[Cell<T>]>,
    mask: usize,
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
}

unsafe impl<T: Send> Send for VyukovMpmcCycleQueue<T> {}
unsafe impl<T: Send> Sync for VyukovMpmcCycleQueue<T> {}

impl<T> VyukovMpmcCycleQueue<T> {
    /// A queue holding at most `capacity` items. `capacity` must be a
    /// power of two, at least 2.
    pub fn new(capacity: usize) -> Self {
        Self::with_traits(capacity, QueueTraits::default())
    }

    /// Same as [`Self::new`] with an explicit runtime policy.
    pub fn with_traits(capacity: usize, traits: QueueTraits) -> Self {
        assert!(capacity >= 2 && capacity.is_power_of_two(), "capacity must be a power of two >= 2");
        let buffer = (0..capacity)
            .map(|i| Cell { sequence: AtomicUsize::new(i), data: UnsafeCell::new(MaybeUninit::uninit()) })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        VyukovMpmcCycleQueue {
            buffer,
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
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
    /// [`super::MsQueue::ord`]. The `Relaxed` cursor reads/CASes below (which
    /// never carry ordering information themselves — the per-cell `sequence`
    /// does that instead) are deliberately left bare, matching Vyukov's
    /// original design; only the cell-sequence accesses resolve through this.
    #[inline]
    fn ord(&self, base: Ordering) -> Ordering {
        self.traits.memory_model.resolve(base)
    }

    /// Append `value`, returning it back on `Err` if the queue was
    /// observed full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut backoff = Backoff::new(self.traits.back_off);
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(self.ord(Ordering::Acquire));
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { (*cell.data.get()).write(value) };
                    cell.sequence.store(pos.wrapping_add(1), self.ord(Ordering::Release));
                    self.counters.record_push();
                    self.len.inc();
                    return Ok(());
                }
                self.counters.record_retry();
                backoff.step();
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            } else if diff < 0 {
                return Err(value);
            } else {
                self.counters.record_retry();
                backoff.step();
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Remove and return the oldest item, or `None` if the queue was
    /// observed empty.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new(self.traits.back_off);
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(self.ord(Ordering::Acquire));
            let diff = seq as isize - pos.wrapping_add(1) as isize;
            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { (*cell.data.get()).assume_init_read() };
                    cell.sequence.store(pos.wrapping_add(self.mask + 1), self.ord(Ordering::Release));
                    self.counters.record_pop();
                    self.len.dec();
                    return Some(value);
                }
                self.counters.record_retry();
                backoff.step();
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            } else if diff < 0 {
                self.counters.record_empty_miss();
                return None;
            } else {
                self.counters.record_retry();
                backoff.step();
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// `true` if no successful `pop` could currently return an item.
    pub fn is_empty(&self) -> bool {
        self.dequeue_pos.load(self.ord(Ordering::Acquire)) == self.enqueue_pos.load(self.ord(Ordering::Acquire))
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

impl<T> Drop for VyukovMpmcCycleQueue<T> {
    fn drop(&mut self) {
        let start = *self.dequeue_pos.get_mut();
        let end = *self.enqueue_pos.get_mut();
        let mask = self.mask;
        let mut pos = start;
        while pos != end {
            let cell = &mut self.buffer[pos & mask];
            unsafe { cell.data.get_mut().assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_up_to_capacity() {
        let q: VyukovMpmcCycleQueue<i32> = VyukovMpmcCycleQueue::new(2);
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
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _q: VyukovMpmcCycleQueue<i32> = VyukovMpmcCycleQueue::new(3);
    }

    #[test]
    fn size_is_zero_unless_item_counter_enabled() {
        let q: VyukovMpmcCycleQueue<i32> = VyukovMpmcCycleQueue::new(4);
        assert_eq!(q.push(1), Ok(()));
        assert_eq!(q.size(), 0);

        let q: VyukovMpmcCycleQueue<i32> = VyukovMpmcCycleQueue::with_traits(
            4,
            QueueTraits::default().with_item_counter(ItemCounter::Atomic),
        );
        assert_eq!(q.push(1), Ok(()));
        assert_eq!(q.push(2), Ok(()));
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }
}
