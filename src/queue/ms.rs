//! The Michael & Scott queue: the baseline unbounded lock-free FIFO every
//! other linked-list queue in this module specializes. Grounded on
//! `concurrent::stack_queue::MichaelScottQueue`, generalized to a pluggable
//! `Reclaim` strategy instead of that module's fixed tagged-pointer scheme.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::ptr;

use crate::atomic::CachePadded;
use crate::backoff::Backoff;
use crate::smr::{HazardPointer, Reclaim, ReclaimGuard, RetireEntry};
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node { data: None, next: AtomicPtr::new(ptr::null_mut()) }))
    }

    fn boxed(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node { data: Some(value), next: AtomicPtr::new(ptr::null_mut()) }))
    }
}

/// The Michael & Scott lock-free FIFO queue. One sentinel node is always
/// present; `head` always points at the sentinel (the last dequeued node),
/// `tail` lags behind the true last node by at most one enqueue in flight.
pub struct MsQueue<T, R: Reclaim = HazardPointer> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
    _marker: PhantomData<R>,
}

unsafe impl<T: Send, R: Reclaim> Send for MsQueue<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for MsQueue<T, R> {}

impl<T, R: Reclaim> Default for MsQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Reclaim> MsQueue<T, R> {
    /// An empty queue with default [`QueueTraits`].
    pub fn new() -> Self {
        Self::with_traits(QueueTraits::default())
    }

    /// An empty queue with explicit runtime policy. Attaches the
    /// constructing thread to `R`'s SMR registry; any other thread that will
    /// push/pop this queue must call `R::attach()` itself first.
    pub fn with_traits(traits: QueueTraits) -> Self {
        R::attach();
        let sentinel = Node::<T>::sentinel();
        MsQueue {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            traits,
            counters: Counters::new(),
            len: ItemCount::new(),
            _marker: PhantomData,
        }
    }

    /// Resolve `base` against this queue's configured [`MemoryModel`]: `base`
    /// unchanged under `Relaxed`, `SeqCst` under `SequentialConsistent`.
    /// Every head/tail/node access below goes through this instead of a bare
    /// `Ordering` literal.
    #[inline]
    fn ord(&self, base: Ordering) -> Ordering {
        self.traits.memory_model.resolve(base)
    }

    /// Append `value` at the tail. Never blocks; always eventually
    /// succeeds under the lock-freedom guarantee (some thread in the
    /// system makes progress on every retry round).
    pub fn push(&self, value: T) {
        let new_node = Node::boxed(value);
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let tail_ptr = guard.protect(&self.tail);
            let tail_ref = unsafe { &*tail_ptr };
            let next_ptr = tail_ref.next.load(self.ord(Ordering::Acquire));
            // re-verify tail hasn't moved since the protect, matching the
            // protect/reload/verify cycle's retry half.
            if tail_ptr != self.tail.load(self.ord(Ordering::Acquire)) {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if next_ptr.is_null() {
                if tail_ref
                    .next
                    .compare_exchange(
                        ptr::null_mut(),
                        new_node,
                        self.ord(Ordering::Release),
                        self.ord(Ordering::Relaxed),
                    )
                    .is_ok()
                {
                    let _ = self.tail.compare_exchange(
                        tail_ptr,
                        new_node,
                        self.ord(Ordering::Release),
                        self.ord(Ordering::Relaxed),
                    );
                    self.counters.record_push();
                    self.len.inc();
                    backoff.reset();
                    return;
                }
            } else {
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next_ptr,
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// Remove and return the item at the head, or `None` if the queue was
    /// observed empty.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let head_ptr = guard.protect(&self.head);
            let head_ref = unsafe { &*head_ptr };
            let next_ptr = guard.protect(&head_ref.next);
            if head_ptr != self.head.load(self.ord(Ordering::Acquire)) {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let tail_ptr = self.tail.load(self.ord(Ordering::Acquire));
            if head_ptr == tail_ptr {
                if next_ptr.is_null() {
                    self.counters.record_empty_miss();
                    return None;
                }
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next_ptr,
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if next_ptr.is_null() {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let data = unsafe { (*next_ptr).data.take() };
            if self
                .head
                .compare_exchange(head_ptr, next_ptr, self.ord(Ordering::Release), self.ord(Ordering::Relaxed))
                .is_ok()
            {
                guard.retire(RetireEntry::for_boxed(head_ptr));
                self.counters.record_retire();
                self.counters.record_pop();
                self.len.dec();
                backoff.reset();
                return data;
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// `true` if no successful `pop` could currently return an item. Racy
    /// under concurrent mutation; exact only when quiesced.
    pub fn is_empty(&self) -> bool {
        let head_ptr = self.head.load(self.ord(Ordering::Acquire));
        let head_ref = unsafe { &*head_ptr };
        head_ref.next.load(self.ord(Ordering::Acquire)).is_null()
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

impl<T, R: Reclaim> Drop for MsQueue<T, R> {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let mut boxed = unsafe { Box::from_raw(cur) };
            cur = *boxed.next.get_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryModel;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_single_threaded() {
        let q: MsQueue<i32> = MsQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn sequential_consistent_memory_model_still_preserves_fifo_order() {
        let q: MsQueue<i32> = MsQueue::with_traits(
            QueueTraits::default().with_memory_model(MemoryModel::SequentialConsistent),
        );
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_queue_pops_none() {
        let q: MsQueue<i32> = MsQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn size_is_zero_unless_item_counter_enabled() {
        let q: MsQueue<i32> = MsQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.size(), 0);

        let q: MsQueue<i32> =
            MsQueue::with_traits(QueueTraits::default().with_item_counter(ItemCounter::Atomic));
        q.push(1);
        q.push(2);
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn concurrent_push_pop_conserves_all_items() {
        let q = Arc::new(MsQueue::<u32>::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    HazardPointer::attach();
                    for i in 0..1000u32 {
                        q.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let mut seen = Vec::new();
        while let Some(v) = q.pop() {
            seen.push(v);
        }
        seen.sort_unstable();
        let expected: Vec<u32> = (0..4000).collect();
        assert_eq!(seen, expected);
    }
}
