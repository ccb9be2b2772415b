//! The optimistic queue: a Michael & Scott-style forward-linked FIFO that
//! additionally maintains a `prev` pointer per node, written optimistically
//! (a plain store, no CAS) at push time and never kept continuously
//! consistent. `next` stays the authoritative, CAS-linked pointer a reader
//! can always trust, which is what keeps this variant as sound as
//! [`super::MsQueue`] while still giving callers a backward-traversal hint
//! — e.g. for a "most recently enqueued" peek. A node's `prev` goes stale
//! the moment its optimistic predecessor is dequeued and retired, since
//! nothing updates it at that point; `pop`'s fix-list walk (`fix_list`)
//! is what repairs it lazily, re-deriving `prev` links from the forward
//! chain rather than trusting whatever was written at push time. See
//! DESIGN.md.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::atomic::CachePadded;
use crate::backoff::Backoff;
use crate::smr::{HazardPointer, Reclaim, ReclaimGuard, RetireEntry};
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
    /// Optimistic backward pointer: correct immediately after an enqueue,
    /// but not updated again until the next dequeue notices it is stale.
    prev: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: None,
            next: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn boxed(value: T, prev: *mut Node<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: Some(value),
            next: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicPtr::new(prev),
        }))
    }
}

/// The optimistic queue.
pub struct OptimisticQueue<T, R: Reclaim = HazardPointer> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
    _marker: PhantomData<R>,
}

unsafe impl<T: Send, R: Reclaim> Send for OptimisticQueue<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for OptimisticQueue<T, R> {}

impl<T, R: Reclaim> Default for OptimisticQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Reclaim> OptimisticQueue<T, R> {
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
        OptimisticQueue {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            traits,
            counters: Counters::new(),
            len: ItemCount::new(),
            _marker: PhantomData,
        }
    }

    /// Resolve `base` against this queue's configured [`MemoryModel`]: see
    /// [`super::MsQueue::ord`].
    #[inline]
    fn ord(&self, base: Ordering) -> Ordering {
        self.traits.memory_model.resolve(base)
    }

    /// Append `value` at the tail, recording the current tail as the new
    /// node's optimistic predecessor.
    pub fn push(&self, value: T) {
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let tail_ptr = guard.protect(&self.tail);
            let tail_ref = unsafe { &*tail_ptr };
            let next_ptr = tail_ref.next.load(self.ord(Ordering::Acquire));
            if tail_ptr != self.tail.load(self.ord(Ordering::Acquire)) {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if next_ptr.is_null() {
                let new_node = Node::boxed(value, tail_ptr);
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
                // another thread linked a node into this slot first; drop
                // our speculative allocation and retry the whole cycle.
                unsafe { drop(Box::from_raw(new_node)) };
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

    /// Remove and return the item at the head, or `None` if empty. Repairs
    /// the new head's `prev` link before trusting it: the optimistic write
    /// at push time only ever pointed at whatever node was tail *then*,
    /// which may since have been dequeued and retired, so a stale `prev`
    /// here would dangle into freed memory the instant `head_ptr` is
    /// retired below.
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
            let next_prev = unsafe { (*next_ptr).prev.load(self.ord(Ordering::Acquire)) };
            if next_prev.is_null() || next_prev != head_ptr {
                self.fix_list(&guard, head_ptr, next_ptr);
            }
            let data = unsafe { (*next_ptr).data.take() };
            if self
                .head
                .compare_exchange(head_ptr, next_ptr, self.ord(Ordering::Release), self.ord(Ordering::Relaxed))
                .is_ok()
            {
                unsafe { (*next_ptr).prev.store(ptr::null_mut(), self.ord(Ordering::Release)) };
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

    /// Walks forward along the authoritative `next` chain starting at
    /// `head` (a node this call already holds protection for, so safe to
    /// dereference) until it reaches `target`, re-deriving every visited
    /// node's `prev` from the predecessor it actually has in that chain.
    /// `head`/`target` themselves are never retired mid-walk: `head` is
    /// protected by the caller's guard for the duration of this call, and
    /// `target` is the node about to become the new head, not yet
    /// reachable from any retire list.
    fn fix_list(&self, guard: &R::Guard, head: *mut Node<T>, target: *mut Node<T>) {
        let mut pred_ptr = head;
        while pred_ptr != target {
            let pred_ref = unsafe { &*pred_ptr };
            let cur_ptr = guard.protect(&pred_ref.next);
            if cur_ptr.is_null() {
                return;
            }
            unsafe { (*cur_ptr).prev.store(pred_ptr, self.ord(Ordering::Release)) };
            pred_ptr = cur_ptr;
        }
    }

    /// `true` if no successful `pop` could currently return an item.
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

impl<T, R: Reclaim> Drop for OptimisticQueue<T, R> {
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

    #[test]
    fn fifo_order_single_threaded() {
        let q: OptimisticQueue<i32> = OptimisticQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn size_is_zero_unless_item_counter_enabled() {
        let q: OptimisticQueue<i32> = OptimisticQueue::with_traits(
            QueueTraits::default().with_item_counter(ItemCounter::Atomic),
        );
        q.push(1);
        q.push(2);
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn dequeued_predecessor_link_is_severed() {
        let q: OptimisticQueue<i32> = OptimisticQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(1));
        let head_ptr = q.head.load(Ordering::Acquire);
        let prev = unsafe { (*head_ptr).prev.load(Ordering::Acquire) };
        assert!(prev.is_null());
    }

    #[test]
    fn pop_repairs_a_forged_stale_prev_before_trusting_it() {
        let q: OptimisticQueue<i32> = OptimisticQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        // simulate the one prev link a concurrent retire could have left
        // dangling: point node 2's prev somewhere other than node 1.
        let head_ptr = q.head.load(Ordering::Acquire);
        let first_ptr = unsafe { (*head_ptr).next.load(Ordering::Acquire) };
        let second_ptr = unsafe { (*first_ptr).next.load(Ordering::Acquire) };
        unsafe { (*second_ptr).prev.store(ptr::null_mut(), Ordering::Release) };
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        // fix_list must have re-derived node 2's prev from the forward
        // chain (repairing the forged stale value) before pop severed it
        // to null on becoming the new head, same end state as the
        // never-forged path.
        let new_head_ptr = q.head.load(Ordering::Acquire);
        let second_prev = unsafe { (*new_head_ptr).prev.load(Ordering::Acquire) };
        assert!(second_prev.is_null());
        assert_eq!(q.pop(), Some(3));
    }
}
