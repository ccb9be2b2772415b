//! The basket queue: a Michael & Scott-style FIFO where concurrent
//! enqueuers that race for the same tail slot don't retry against a
//! freshly re-read tail the way [`super::MsQueue`]/[`super::MoirQueue`]
//! do — a losing pusher instead walks forward from the exact slot it lost
//! and joins the winner's run as a sibling (`push`/`join_basket`), so a
//! burst of concurrent pushes ends up chained together as one "basket"
//! even though `tail` itself lags behind all of them. Dequeue marks a
//! node's link tombstoned (a 1-bit tag on the `next` pointer pointing at
//! it) instead of always physically unlinking it on the same CAS that
//! claims it. A later pop (possibly the same one, possibly a different
//! thread's) sweeps one or more consecutive tombstoned nodes off the head
//! in a batch. Within a basket, relative order is not guaranteed, which is
//! the trade this structure makes for higher throughput under contention;
//! order across baskets is preserved exactly like a plain FIFO.

use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use crate::atomic::{AtomicTaggedPtr, CachePadded, TaggedPtr};
use crate::backoff::Backoff;
use crate::smr::{HazardPointer, Reclaim, ReclaimGuard, RetireEntry};
use crate::stat::{Counters, ItemCount, Stats};
use crate::traits::{ItemCounter, QueueTraits};
use std::sync::atomic::AtomicPtr;

struct Node<T> {
    data: Option<T>,
    next: AtomicTaggedPtr<Node<T>, 1>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node { data: None, next: AtomicTaggedPtr::new(TaggedPtr::null()) }))
    }

    fn boxed(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: Some(value),
            next: AtomicTaggedPtr::new(TaggedPtr::null()),
        }))
    }
}

/// The basket queue.
pub struct BasketQueue<T, R: Reclaim = HazardPointer> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    traits: QueueTraits,
    counters: Counters,
    len: ItemCount,
    _marker: PhantomData<R>,
}

unsafe impl<T: Send, R: Reclaim> Send for BasketQueue<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for BasketQueue<T, R> {}

impl<T, R: Reclaim> Default for BasketQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Reclaim> BasketQueue<T, R> {
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
        BasketQueue {
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

    /// Append `value` at the tail, or alongside it as a basket sibling if
    /// this call loses the tail CAS to a concurrent pusher.
    pub fn push(&self, value: T) {
        let new_node = Node::boxed(value);
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let tail_ptr = guard.protect(&self.tail);
            let tail_ref = unsafe { &*tail_ptr };
            let next_tagged = tail_ref.next.load(self.ord(Ordering::Acquire));
            if tail_ptr != self.tail.load(self.ord(Ordering::Acquire)) {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if next_tagged.is_null() {
                if tail_ref
                    .next
                    .compare_exchange(
                        next_tagged,
                        TaggedPtr::new(new_node, 0),
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
                // lost the race for this slot: join the winner's basket by
                // walking forward from this exact position instead of
                // retrying against a freshly re-read tail, landing as a
                // sibling at the same logical position rather than
                // strictly after whatever else has since been appended.
                if self.join_basket(&guard, tail_ptr, new_node) {
                    self.counters.record_push();
                    self.len.inc();
                    backoff.reset();
                    return;
                }
            } else {
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next_tagged.ptr(),
                    self.ord(Ordering::Release),
                    self.ord(Ordering::Relaxed),
                );
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// Walks forward from `from` (the node this call just lost a tail CAS
    /// on) along whatever run of nodes has been linked in since, CASing
    /// `new_node` into the first open (`next == null`, untombstoned) slot
    /// it finds — joining the winner's basket rather than re-reading
    /// `self.tail` and retrying the whole cycle fresh. Returns `false` if a
    /// dequeuer tombstones the run out from under this walk before an open
    /// slot turns up, in which case the caller falls back to the ordinary
    /// retry path.
    fn join_basket(&self, guard: &R::Guard, from: *mut Node<T>, new_node: *mut Node<T>) -> bool {
        let mut cur_ptr = from;
        loop {
            let cur_ref = unsafe { &*cur_ptr };
            let cur_next = cur_ref.next.load(self.ord(Ordering::Acquire));
            if cur_next.tag() == 1 {
                return false;
            }
            if cur_next.is_null() {
                if cur_ref
                    .next
                    .compare_exchange(
                        cur_next,
                        TaggedPtr::new(new_node, 0),
                        self.ord(Ordering::Release),
                        self.ord(Ordering::Relaxed),
                    )
                    .is_ok()
                {
                    let _ = self.tail.compare_exchange(
                        from,
                        new_node,
                        self.ord(Ordering::Release),
                        self.ord(Ordering::Relaxed),
                    );
                    return true;
                }
                // someone else just claimed this slot; re-check it on the
                // next spin of this same walk rather than unwinding.
                continue;
            }
            guard.protect_raw(cur_next.ptr());
            cur_ptr = cur_next.ptr();
        }
    }

    /// Remove and return an item, or `None` if the queue was observed
    /// empty. Which item, among several claimed in the same unswept run,
    /// is not guaranteed to be the oldest — see module docs.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let head_ptr = guard.protect(&self.head);
            let head_ref = unsafe { &*head_ptr };
            let next_tagged = head_ref.next.load(self.ord(Ordering::Acquire));
            let next_ptr = next_tagged.ptr();
            if next_ptr.is_null() {
                if head_ptr == self.tail.load(self.ord(Ordering::Acquire)) {
                    self.counters.record_empty_miss();
                    return None;
                }
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            guard.protect_raw(next_ptr);
            if head_ref.next.load(self.ord(Ordering::Acquire)) != next_tagged
                || head_ptr != self.head.load(self.ord(Ordering::Acquire))
            {
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let tail_ptr = self.tail.load(self.ord(Ordering::Acquire));
            if head_ptr == tail_ptr {
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
            if next_tagged.tag() == 1 {
                // already claimed by a racing pop; sweep it out and keep
                // scanning forward rather than returning empty-handed.
                if self
                    .head
                    .compare_exchange(head_ptr, next_ptr, self.ord(Ordering::Release), self.ord(Ordering::Relaxed))
                    .is_ok()
                {
                    guard.retire(RetireEntry::for_boxed(head_ptr));
                    self.counters.record_retire();
                }
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let claimed = TaggedPtr::new(next_ptr, 1);
            if head_ref
                .next
                .compare_exchange(next_tagged, claimed, self.ord(Ordering::AcqRel), self.ord(Ordering::Acquire))
                .is_ok()
            {
                let data = unsafe { (*next_ptr).data.take() };
                if self
                    .head
                    .compare_exchange(head_ptr, next_ptr, self.ord(Ordering::Release), self.ord(Ordering::Relaxed))
                    .is_ok()
                {
                    guard.retire(RetireEntry::for_boxed(head_ptr));
                    self.counters.record_retire();
                }
                self.counters.record_pop();
                self.len.dec();
                backoff.reset();
                return data;
            }
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

impl<T, R: Reclaim> Drop for BasketQueue<T, R> {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let boxed = unsafe { Box::from_raw(cur) };
            cur = boxed.next.load(Ordering::Relaxed).ptr();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_threaded_preserves_order_with_no_contention() {
        let q: BasketQueue<i32> = BasketQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn losing_a_tail_cas_joins_the_winners_basket_instead_of_retrying_fresh() {
        let q: BasketQueue<i32> = BasketQueue::new();
        let old_tail = q.tail.load(Ordering::Acquire);
        q.push(1);
        let winner_ptr = q.tail.load(Ordering::Acquire);
        assert_ne!(winner_ptr, old_tail);
        // simulate a second pusher that lost the original tail CAS against
        // `old_tail`: it should join the winner's basket directly rather
        // than retrying against a freshly re-read tail.
        let guard = HazardPointer::pin();
        let sibling = Node::boxed(2);
        assert!(q.join_basket(&guard, old_tail, sibling));
        let winner_next = unsafe { (*winner_ptr).next.load(Ordering::Acquire) };
        assert_eq!(winner_next.ptr(), sibling);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn size_is_zero_unless_item_counter_enabled() {
        let q: BasketQueue<i32> =
            BasketQueue::with_traits(QueueTraits::default().with_item_counter(ItemCounter::Atomic));
        q.push(1);
        q.push(2);
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn concurrent_push_pop_conserves_all_items_quasi_fifo() {
        let q = Arc::new(BasketQueue::<u32>::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    HazardPointer::attach();
                    for i in 0..500u32 {
                        q.push(t * 500 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let mut seen = HashSet::new();
        while let Some(v) = q.pop() {
            seen.insert(v);
        }
        let expected: HashSet<u32> = (0..2000).collect();
        assert_eq!(seen, expected);
    }
}
