//! Moir's queue: the same Michael & Scott backbone as [`super::MsQueue`],
//! refined so a node is marked logically removed before it is unlinked,
//! rather than the two events being one and the same CAS. This lets a
//! concurrent helper walking the list (as `OptimisticQueue`'s tail fixup
//! does) tell "unlinked" apart from "never linked" without racing the
//! disposer. See DESIGN.md for why this crate takes that distinction over
//! libcds's alternative (a disposer-skipping node-pool), which would need a
//! free-list threaded through every node and a way to recycle a retired
//! pointer back into service — sound, but not worth the extra unsafe
//! surface for the marginal allocator-pressure win.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::atomic::CachePadded;
use crate::backoff::Backoff;
use crate::smr::{HazardPointer, Reclaim, ReclaimGuard, RetireEntry};
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
    retired: AtomicBool,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: None,
            next: AtomicPtr::new(ptr::null_mut()),
            retired: AtomicBool::new(false),
        }))
    }

    fn boxed(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: Some(value),
            next: AtomicPtr::new(ptr::null_mut()),
            retired: AtomicBool::new(false),
        }))
    }
}

/// Moir's queue. Same public contract as [`super::MsQueue`].
pub struct MoirQueue<T, R: Reclaim = HazardPointer> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
    _marker: PhantomData<R>,
}

unsafe impl<T: Send, R: Reclaim> Send for MoirQueue<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for MoirQueue<T, R> {}

impl<T, R: Reclaim> Default for MoirQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Reclaim> MoirQueue<T, R> {
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
        MoirQueue {
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

    /// Append `value` at the tail.
    pub fn push(&self, value: T) {
        let new_node = Node::boxed(value);
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
            // mark the node retiring before unlinking: a concurrent helper
            // that already holds `head_ptr` protected sees `retired` before
            // it could ever observe the node detached from the list.
            unsafe { (*head_ptr).retired.store(true, self.ord(Ordering::Release)) };
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
            unsafe { (*head_ptr).retired.store(false, self.ord(Ordering::Release)) };
            self.counters.record_retry();
            backoff.step();
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

impl<T, R: Reclaim> Drop for MoirQueue<T, R> {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let mut boxed = unsafe { Box::from_raw(cur) };
            cur = *boxed.next.get_mut();
        }
    }
}
