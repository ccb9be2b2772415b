//! The Ellen binary search tree (L7): a leaf-oriented lock-free BST where
//! every real key lives in a leaf and internal nodes are pure routing
//! nodes. Grounded on `original_source/cds/intrusive/ellen_bintree_nogc.h`
//! for the shape of `search`/`try_insert`/`help_insert` and the
//! `m_Root`/`m_LeafInf1`/`m_LeafInf2` sentinel layout; that header ships
//! only the reclamation-free, insert-only variant, so `erase`/`help_delete`
//! below are this crate's own implementation of the classic Ellen,
//! Fatourou, Ruppert & Spear two-step delete (grandparent-DFlag /
//! parent-Mark), there being no delete path in the retrieved source to work
//! from. See DESIGN.md.
//!
//! Every modifying operation that finds a node's `update` field in a
//! non-`Clean` state finishes that pending operation itself before
//! proceeding (the help protocol) — this is what makes the tree wait-free
//! at the help level even though an individual thread's own `insert`/
//! `erase` call is only lock-free.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering as AtomicOrdering};

use crate::atomic::{AtomicTaggedPtr, TaggedPtr};
use crate::backoff::Backoff;
use crate::smr::{GuardedPtr, HazardPointer, Reclaim, ReclaimGuard, RetireEntry};
use crate::stat::{Counters, Stats};
use crate::traits::TreeTraits;
use crate::update_desc::{DeleteInfo, InsertInfo, Operation, UpdateDescriptor, UpdateState};

/// A leaf's or internal routing node's key: a real value, or one of the two
/// sentinel "infinities" the tree is seeded with.
#[derive(Debug, Clone)]
enum Key<K> {
    Finite(K),
    Inf1,
    Inf2,
}

/// Both infinities compare greater than every real key; an insert that
/// displaces one of them only cares that this holds, never which of the
/// two it is (see `build_internal`). This keeps the tree's right spine
/// non-empty so `search` never needs a special empty-tree case.
fn compare_key<K: Ord>(search_key: &K, node_key: &Key<K>) -> Ordering {
    match node_key {
        Key::Finite(k) => search_key.cmp(k),
        Key::Inf1 | Key::Inf2 => Ordering::Less,
    }
}

enum Node<K, V> {
    Internal(Internal<K, V>),
    Leaf(Leaf<K, V>),
    /// One of the two `+infinity` boundary markers the tree is seeded with.
    /// Carries no value: a sentinel never matches a real search key (see
    /// `compare_key`) and so is never dereferenced through `as_leaf`.
    Sentinel(Key<K>),
}

struct Internal<K, V> {
    key: Key<K>,
    left: AtomicPtr<Node<K, V>>,
    right: AtomicPtr<Node<K, V>>,
    update: AtomicTaggedPtr<UpdateDescriptor<Node<K, V>>, 2>,
}

struct Leaf<K, V> {
    key: Key<K>,
    value: V,
}

type UpdatePtr<K, V> = TaggedPtr<UpdateDescriptor<Node<K, V>>, 2>;

fn clean<K, V>() -> UpdatePtr<K, V> {
    TaggedPtr::null()
}

/// # Safety
/// `p` must point at a live `Node::Internal`.
unsafe fn as_internal<'a, K, V>(p: *mut Node<K, V>) -> &'a Internal<K, V> {
    match &*p {
        Node::Internal(i) => i,
        _ => unreachable!("ellen tree: expected an internal node"),
    }
}

/// # Safety
/// `p` must point at a live `Node::Leaf` (never a sentinel). Every call site
/// is reached only after `search` reports `found`, which is only possible
/// for a `Key::Finite` match — sentinels never satisfy that.
unsafe fn as_leaf<'a, K, V>(p: *mut Node<K, V>) -> &'a Leaf<K, V> {
    match &*p {
        Node::Leaf(l) => l,
        _ => unreachable!("ellen tree: expected a finite leaf node"),
    }
}

fn is_internal<K, V>(p: *mut Node<K, V>) -> bool {
    matches!(unsafe { &*p }, Node::Internal(_))
}

fn node_key<K, V>(p: *mut Node<K, V>) -> &'static Key<K> {
    // SAFETY: every raw pointer this module hands around is reachable from
    // the tree (and so not yet retired) for at least the caller's guard
    // scope; the 'static is a convenience bounded by that scope, never
    // smuggled past it.
    unsafe {
        match &*p {
            Node::Internal(i) => &i.key,
            Node::Leaf(l) => &l.key,
            Node::Sentinel(k) => k,
        }
    }
}

fn leaf_boxed<K, V>(key: K, value: V) -> *mut Node<K, V> {
    Box::into_raw(Box::new(Node::Leaf(Leaf { key: Key::Finite(key), value })))
}

/// Build the internal node that replaces `old_leaf` (a real leaf or a
/// sentinel) with a subtree holding both `old_leaf` and `new_leaf`,
/// following `try_insert`'s branch-key construction: whichever sorts first
/// becomes the left child, and the routing key is the greater one's key
/// (promoting the bare sentinel marker up a level when that greater one is
/// itself a sentinel, since a sentinel is never a valid comparison key for
/// a real search).
fn build_internal<K: Ord + Clone, V>(
    new_key: &K,
    old_leaf: *mut Node<K, V>,
    new_leaf: *mut Node<K, V>,
) -> *mut Node<K, V> {
    let old_key = node_key::<K, V>(old_leaf);
    let (key, left, right) = if compare_key(new_key, old_key) == Ordering::Less {
        let promoted = match old_key {
            Key::Finite(k) => Key::Finite(k.clone()),
            Key::Inf1 | Key::Inf2 => Key::Inf1,
        };
        (promoted, new_leaf, old_leaf)
    } else {
        (Key::Finite(new_key.clone()), old_leaf, new_leaf)
    };
    Box::into_raw(Box::new(Node::Internal(Internal {
        key,
        left: AtomicPtr::new(left),
        right: AtomicPtr::new(right),
        update: AtomicTaggedPtr::new(clean()),
    })))
}

struct SearchResult<K, V> {
    grandparent: *mut Node<K, V>,
    grandparent_update: UpdatePtr<K, V>,
    parent: *mut Node<K, V>,
    parent_update: UpdatePtr<K, V>,
    leaf: *mut Node<K, V>,
    right_parent: bool,
    right_leaf: bool,
    found: bool,
}

/// Load `atomic`, publish it as protected, then reload to confirm it is
/// still current — the protect/reload/verify cycle required before a
/// hazard-protected pointer may be dereferenced. On a mismatch the stale
/// protection is released via `rewind` (nothing was ever dereferenced
/// through it) and the load retried.
fn protect_validated<G: ReclaimGuard, T>(guard: &G, atomic: &AtomicPtr<T>, ord: AtomicOrdering) -> *mut T {
    loop {
        let checkpoint = guard.checkpoint();
        let p = guard.protect(atomic);
        if p == atomic.load(ord) {
            return p;
        }
        guard.rewind(checkpoint);
    }
}

/// The Ellen binary search tree: a leaf-oriented, lock-free ordered set/map
/// keyed by `K` storing `V`. Generic over a [`Reclaim`] strategy exactly
/// like the queue family, since both node retirement (on `erase`) and
/// update-descriptor retirement (on both `insert` and `erase`) share the
/// same SMR substrate.
pub struct EllenTree<K, V, R: Reclaim = HazardPointer> {
    root: *mut Node<K, V>,
    traits: TreeTraits,
    counters: Counters,
    size: AtomicUsize,
    _marker: PhantomData<R>,
}

unsafe impl<K: Send, V: Send, R: Reclaim> Send for EllenTree<K, V, R> {}
unsafe impl<K: Send + Sync, V: Send + Sync, R: Reclaim> Sync for EllenTree<K, V, R> {}

impl<K: Ord + Clone, V, R: Reclaim> Default for EllenTree<K, V, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V, R: Reclaim> EllenTree<K, V, R> {
    /// An empty tree with default [`TreeTraits`].
    pub fn new() -> Self {
        Self::with_traits(TreeTraits::default())
    }

    /// An empty tree with explicit runtime policy. Attaches the constructing
    /// thread to `R`'s SMR registry; any other thread that will operate on
    /// this tree must call `R::attach()` itself first.
    pub fn with_traits(traits: TreeTraits) -> Self {
        R::attach();
        let leaf_inf1 = Box::into_raw(Box::new(Node::Sentinel(Key::Inf1)));
        let leaf_inf2 = Box::into_raw(Box::new(Node::Sentinel(Key::Inf2)));
        let root = Box::into_raw(Box::new(Node::Internal(Internal {
            key: Key::Inf2,
            left: AtomicPtr::new(leaf_inf1),
            right: AtomicPtr::new(leaf_inf2),
            update: AtomicTaggedPtr::new(clean()),
        })));
        EllenTree {
            root,
            traits,
            counters: Counters::new(),
            size: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// Resolve `base` against this tree's configured [`MemoryModel`]: see
    /// [`crate::queue::MsQueue::ord`].
    #[inline]
    fn ord(&self, base: AtomicOrdering) -> AtomicOrdering {
        self.traits.memory_model.resolve(base)
    }

    fn search(&self, key: &K, guard: &R::Guard) -> SearchResult<K, V> {
        let root_internal = unsafe { as_internal::<K, V>(self.root) };
        let mut grandparent: *mut Node<K, V> = ptr::null_mut();
        let mut grandparent_update = clean();
        let mut parent = self.root;
        let mut parent_update = root_internal.update.load(self.ord(AtomicOrdering::Acquire));
        let mut right_parent = false;
        let mut right_leaf = compare_key(key, &root_internal.key) != Ordering::Less;
        let mut leaf = protect_validated(
            guard,
            if right_leaf { &root_internal.right } else { &root_internal.left },
            self.ord(AtomicOrdering::Acquire),
        );

        while is_internal(leaf) {
            grandparent = parent;
            grandparent_update = parent_update;
            parent = leaf;
            right_parent = right_leaf;
            let parent_internal = unsafe { as_internal::<K, V>(parent) };
            parent_update = parent_internal.update.load(self.ord(AtomicOrdering::Acquire));
            right_leaf = compare_key(key, &parent_internal.key) != Ordering::Less;
            let child = if right_leaf { &parent_internal.right } else { &parent_internal.left };
            leaf = protect_validated(guard, child, self.ord(AtomicOrdering::Acquire));
        }

        let found = compare_key(key, node_key(leaf)) == Ordering::Equal;
        SearchResult {
            grandparent,
            grandparent_update,
            parent,
            parent_update,
            leaf,
            right_parent,
            right_leaf,
            found,
        }
    }

    /// Finish whatever operation `update` describes, regardless of which
    /// thread initiated it. Every modifying operation calls this on any
    /// non-`Clean` update it encounters before proceeding with its own
    /// work (the help protocol).
    fn help(&self, update: UpdatePtr<K, V>) {
        match UpdateState::from(update.tag() as u8) {
            UpdateState::Clean => {}
            UpdateState::IFlag => {
                let desc = unsafe { &*update.ptr() };
                if let Operation::Insert(info) = &desc.op {
                    self.help_insert(info, update);
                }
            }
            UpdateState::DFlag => {
                let desc = unsafe { &*update.ptr() };
                if let Operation::Delete(info) = &desc.op {
                    self.help_delete(info, update);
                }
            }
            UpdateState::Mark => {
                let desc = unsafe { &*update.ptr() };
                if let Operation::Delete(info) = &desc.op {
                    self.help_marked(info, update.ptr());
                }
            }
        }
    }

    fn help_insert(&self, info: &InsertInfo<Node<K, V>>, update: UpdatePtr<K, V>) {
        let parent = unsafe { as_internal::<K, V>(info.parent) };
        let child = if info.right_leaf { &parent.right } else { &parent.left };
        let _ = child.compare_exchange(
            info.leaf,
            info.new_internal,
            self.ord(AtomicOrdering::Release),
            self.ord(AtomicOrdering::Relaxed),
        );
        let _ = parent.update.compare_exchange(
            update,
            clean(),
            self.ord(AtomicOrdering::Release),
            self.ord(AtomicOrdering::Relaxed),
        );
    }

    /// Mark `info.parent` for removal, then finish the splice. Returns
    /// `true` if the delete that owns `info` completed (by this thread or
    /// by whichever thread wins the mark CAS); `false` if an unrelated
    /// operation got to `parent` first, meaning the caller's delete attempt
    /// must restart from a fresh `search`.
    fn help_delete(&self, info: &DeleteInfo<Node<K, V>>, update: UpdatePtr<K, V>) -> bool {
        let parent = unsafe { as_internal::<K, V>(info.parent) };
        let marked = TaggedPtr::new(update.ptr(), UpdateState::Mark as usize);
        match parent.update.compare_exchange(
            info.parent_update_snapshot,
            marked,
            self.ord(AtomicOrdering::AcqRel),
            self.ord(AtomicOrdering::Acquire),
        ) {
            Ok(_) => {
                self.help_marked(info, update.ptr());
                true
            }
            Err(current) => {
                if current.ptr() == update.ptr() && UpdateState::from(current.tag() as u8) == UpdateState::Mark {
                    // a racing helper already marked parent on our behalf.
                    self.help_marked(info, update.ptr());
                    true
                } else {
                    // parent moved on to something unrelated; back the
                    // grandparent's flag out to Clean and let the caller
                    // retry the whole delete from a fresh search.
                    let grandparent = unsafe { as_internal::<K, V>(info.grandparent) };
                    let _ = grandparent.update.compare_exchange(
                        update,
                        clean(),
                        self.ord(AtomicOrdering::Release),
                        self.ord(AtomicOrdering::Relaxed),
                    );
                    false
                }
            }
        }
    }

    /// Swing the grandparent's child pointer past the marked `parent`, then
    /// clear the grandparent's flag. Only the thread that wins that last
    /// CAS retires `parent`, `info.leaf`, and the descriptor itself, so a
    /// descriptor or node is never handed to the reclaimer twice even
    /// though several threads may run this concurrently on the same
    /// `info`.
    fn help_marked(&self, info: &DeleteInfo<Node<K, V>>, desc_ptr: *mut UpdateDescriptor<Node<K, V>>) {
        let parent = unsafe { as_internal::<K, V>(info.parent) };
        let left = parent.left.load(self.ord(AtomicOrdering::Acquire));
        let other = if left == info.leaf { parent.right.load(self.ord(AtomicOrdering::Acquire)) } else { left };
        let grandparent = unsafe { as_internal::<K, V>(info.grandparent) };
        let gp_child = if info.right_parent { &grandparent.right } else { &grandparent.left };
        let _ = gp_child.compare_exchange(
            info.parent,
            other,
            self.ord(AtomicOrdering::Release),
            self.ord(AtomicOrdering::Relaxed),
        );
        let dflag_tagged = TaggedPtr::new(desc_ptr, UpdateState::DFlag as usize);
        if grandparent
            .update
            .compare_exchange(dflag_tagged, clean(), self.ord(AtomicOrdering::Release), self.ord(AtomicOrdering::Relaxed))
            .is_ok()
        {
            let guard = R::pin();
            guard.retire(RetireEntry::for_boxed(info.parent));
            self.counters.record_retire();
            guard.retire(RetireEntry::for_boxed(info.leaf));
            self.counters.record_retire();
            guard.retire(RetireEntry::for_boxed(desc_ptr));
            self.counters.record_retire();
        }
    }

    /// Insert `key` -> `value`, running `on_insert` with the stored pair
    /// immediately after the link is published. Returns `false` if `key`
    /// was already present (`value` is dropped in that case).
    pub fn insert_with(&self, key: K, value: V, on_insert: impl FnOnce(&K, &V)) -> bool {
        let mut backoff = Backoff::new(self.traits.back_off);
        let new_leaf = leaf_boxed(key.clone(), value);
        loop {
            let guard = R::pin();
            let res = self.search(&key, &guard);
            if res.found {
                unsafe { drop(Box::from_raw(new_leaf)) };
                return false;
            }
            if UpdateState::from(res.parent_update.tag() as u8) != UpdateState::Clean {
                self.help(res.parent_update);
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let new_internal = build_internal(&key, res.leaf, new_leaf);
            let desc = UpdateDescriptor::new_insert(InsertInfo {
                parent: res.parent,
                new_internal,
                leaf: res.leaf,
                right_leaf: res.right_leaf,
            });
            let parent = unsafe { as_internal::<K, V>(res.parent) };
            let proposed = TaggedPtr::new(desc, UpdateState::IFlag as usize);
            if parent
                .update
                .compare_exchange(res.parent_update, proposed, self.ord(AtomicOrdering::AcqRel), self.ord(AtomicOrdering::Acquire))
                .is_ok()
            {
                let info = match unsafe { &(*desc).op } {
                    Operation::Insert(info) => info,
                    Operation::Delete(_) => unreachable!(),
                };
                self.help_insert(info, proposed);
                on_insert(&key, &unsafe { as_leaf::<K, V>(new_leaf) }.value);
                self.size.fetch_add(1, self.ord(AtomicOrdering::Relaxed));
                self.counters.record_push();
                backoff.reset();
                return true;
            }
            // lost the race for `parent`'s update slot: `new_internal` was
            // never linked in, so free it and retry with the same `new_leaf`.
            unsafe {
                drop(Box::from_raw(desc));
                drop(Box::from_raw(new_internal));
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// Insert `key` -> `value`. `false` if `key` was already present.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.insert_with(key, value, |_, _| {})
    }

    /// `true` iff `key` is currently in the tree.
    pub fn contains(&self, key: &K) -> bool {
        let guard = R::pin();
        self.search(key, &guard).found
    }

    /// Run `f` with the key/value pair stored for `key`, returning whether
    /// it was found.
    pub fn find(&self, key: &K, f: impl FnOnce(&K, &V)) -> bool {
        let guard = R::pin();
        let res = self.search(key, &guard);
        if !res.found {
            return false;
        }
        let leaf = unsafe { as_leaf::<K, V>(res.leaf) };
        f(key, &leaf.value);
        true
    }

    /// A guarded reference to the value stored for `key`, or `None`. The
    /// returned guard's hazard protection is what keeps the owning leaf
    /// (and so the value inside it) alive, even across a concurrent
    /// `erase` of the same key, for as long as the handle is held.
    pub fn get(&self, key: &K) -> Option<GuardedPtr<V, R>> {
        let guard = R::pin();
        let res = self.search(key, &guard);
        if !res.found {
            return None;
        }
        let leaf = unsafe { as_leaf::<K, V>(res.leaf) };
        Some(GuardedPtr::new(guard, &leaf.value as *const V))
    }

    /// Update the value for `key` via `f(found, key, value)`, inserting
    /// `value` first if `allow_insert` and the key was absent. Returns
    /// `(found, inserted)`.
    ///
    /// `f` runs exactly once: on the existing value if `key` was already
    /// present, on the freshly inserted value if it wasn't, or — if this
    /// call's own `insert_with` lost a race to a concurrent inserter of the
    /// same key — on whatever that other thread installed.
    pub fn update(&self, key: K, value: V, f: impl FnOnce(bool, &K, &V), allow_insert: bool) -> (bool, bool) {
        let slot = std::cell::Cell::new(Some(f));
        let invoke = |found: bool, k: &K, v: &V| {
            if let Some(f) = slot.take() {
                f(found, k, v);
            }
        };
        if self.find(&key, |k, v| invoke(true, k, v)) {
            return (true, false);
        }
        if !allow_insert {
            return (false, false);
        }
        if self.insert_with(key.clone(), value, |k, v| invoke(false, k, v)) {
            return (false, true);
        }
        let found = self.find(&key, |k, v| invoke(true, k, v));
        (found, false)
    }

    /// Remove `key`. `false` if absent.
    pub fn erase(&self, key: &K) -> bool {
        self.erase_inner(key, &|_, _| true, &|_| {})
    }

    /// Remove `key` only if `pred(key, value)` returns `true`.
    pub fn erase_with(&self, key: &K, pred: impl Fn(&K, &V) -> bool) -> bool {
        self.erase_inner(key, &pred, &|_| {})
    }

    /// Remove and return a clone of `key`'s value, or `None` if absent.
    /// Cloning is required rather than moving the value out directly: the
    /// leaf may still be protected by another thread's hazard pointer at
    /// the instant this thread wins the delete, so the value's storage
    /// cannot be invalidated until the SMR registry actually reclaims the
    /// node.
    pub fn extract(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let captured: std::cell::Cell<Option<V>> = std::cell::Cell::new(None);
        let removed = self.erase_inner(key, &|_, _| true, &|v: &V| captured.set(Some(v.clone())));
        if removed {
            captured.take()
        } else {
            None
        }
    }

    fn find_extreme_key(&self, rightmost: bool) -> Option<K> {
        let guard = R::pin();
        let mut cur = self.root;
        loop {
            let internal = unsafe { as_internal::<K, V>(cur) };
            let child = if rightmost { &internal.right } else { &internal.left };
            let next = protect_validated(&guard, child, self.ord(AtomicOrdering::Acquire));
            if !is_internal(next) {
                return match node_key::<K, V>(next) {
                    Key::Finite(k) => Some(k.clone()),
                    Key::Inf1 | Key::Inf2 => None,
                };
            }
            cur = next;
        }
    }

    /// Remove and return the smallest key's value, or `None` if empty.
    pub fn extract_min(&self) -> Option<V>
    where
        V: Clone,
    {
        loop {
            let key = self.find_extreme_key(false)?;
            if let Some(v) = self.extract(&key) {
                return Some(v);
            }
            // a racing thread extracted that exact key first; look again.
        }
    }

    /// Remove and return the largest key's value, or `None` if empty.
    pub fn extract_max(&self) -> Option<V>
    where
        V: Clone,
    {
        loop {
            let key = self.find_extreme_key(true)?;
            if let Some(v) = self.extract(&key) {
                return Some(v);
            }
        }
    }

    fn erase_inner(&self, key: &K, pred: &dyn Fn(&K, &V) -> bool, capture: &dyn Fn(&V)) -> bool {
        let mut backoff = Backoff::new(self.traits.back_off);
        loop {
            let guard = R::pin();
            let res = self.search(key, &guard);
            if !res.found || res.grandparent.is_null() {
                // A real key only ever sits directly under the root (no
                // grandparent) before the tree's first insert has run, at
                // which point it is one of the two sentinels and never
                // reported as `found`. So this arm is reachable only for
                // "not found".
                return false;
            }
            {
                let leaf = unsafe { as_leaf::<K, V>(res.leaf) };
                if !pred(key, &leaf.value) {
                    return false;
                }
            }
            if UpdateState::from(res.grandparent_update.tag() as u8) != UpdateState::Clean {
                self.help(res.grandparent_update);
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            if UpdateState::from(res.parent_update.tag() as u8) != UpdateState::Clean {
                self.help(res.parent_update);
                self.counters.record_retry();
                backoff.step();
                continue;
            }
            let desc = UpdateDescriptor::new_delete(DeleteInfo {
                grandparent: res.grandparent,
                parent: res.parent,
                leaf: res.leaf,
                right_parent: res.right_parent,
                parent_update_snapshot: res.parent_update,
            });
            let grandparent = unsafe { as_internal::<K, V>(res.grandparent) };
            let proposed = TaggedPtr::new(desc, UpdateState::DFlag as usize);
            if grandparent
                .update
                .compare_exchange(res.grandparent_update, proposed, self.ord(AtomicOrdering::AcqRel), self.ord(AtomicOrdering::Acquire))
                .is_ok()
            {
                let info = match unsafe { &(*desc).op } {
                    Operation::Delete(info) => info,
                    Operation::Insert(_) => unreachable!(),
                };
                // `res.leaf` is still protected by `guard`, which outlives
                // this call, so capturing the value here is sound
                // regardless of how quickly `help_delete` below finishes
                // the splice and retires it.
                capture(&unsafe { as_leaf::<K, V>(res.leaf) }.value);
                if self.help_delete(info, proposed) {
                    self.size.fetch_sub(1, self.ord(AtomicOrdering::Relaxed));
                    self.counters.record_pop();
                    backoff.reset();
                    return true;
                }
            } else {
                self.help(grandparent.update.load(self.ord(AtomicOrdering::Acquire)));
            }
            self.counters.record_retry();
            backoff.step();
        }
    }

    /// `true` iff the tree has no keys.
    pub fn empty(&self) -> bool {
        let root = unsafe { as_internal::<K, V>(self.root) };
        !is_internal(root.left.load(self.ord(AtomicOrdering::Relaxed)))
    }

    /// Number of keys currently in the tree. Exact: every successful
    /// `insert`/`erase` updates an atomic counter, which is cheap enough for
    /// this structure to keep exact rather than estimated.
    pub fn size(&self) -> usize {
        self.size.load(self.ord(AtomicOrdering::Relaxed))
    }

    /// A snapshot of this tree's operation counters.
    pub fn statistics(&self) -> Stats {
        self.counters.snapshot()
    }
}

impl<K, V, R: Reclaim> Drop for EllenTree<K, V, R> {
    fn drop(&mut self) {
        fn free<K, V>(p: *mut Node<K, V>) {
            if p.is_null() {
                return;
            }
            let boxed = unsafe { Box::from_raw(p) };
            if let Node::Internal(internal) = *boxed {
                let update = internal.update.load(AtomicOrdering::Relaxed);
                if !update.is_null() {
                    unsafe { drop(Box::from_raw(update.ptr())) };
                }
                free(internal.left.load(AtomicOrdering::Relaxed));
                free(internal.right.load(AtomicOrdering::Relaxed));
            }
        }
        free(self.root);
    }
}
