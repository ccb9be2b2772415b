//! Tagged pointers and the memory-ordering discipline shared by every layer.
//!
//! Every pointer field inside the core is an atomic of pointer width. The
//! crate sticks to five orderings: `Relaxed`, `Acquire`, `Release`, `AcqRel`,
//! `SeqCst`. Readers that dereference use `Acquire`; writers publishing
//! newly-initialized memory use `Release`; a successful linearization CAS
//! uses `AcqRel` on success and `Acquire` on failure; statistics use
//! `Relaxed`.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pads `T` out to a full cache line, so two `CachePadded` fields placed next
/// to each other in a struct never share a line and so never false-share
/// under concurrent writes from different threads. Grounded on
/// `concurrency::types::CoreLocal`'s `#[repr(C, align(64))]` and
/// `concurrency::queues::WorkQueue`'s `#[repr(C, align(128))]` head/tail
/// separation; 64 bytes covers every mainstream target this crate runs on.
///
/// Every queue in this crate wraps its `head`/`tail` cursor in this
/// unconditionally — there is no runtime on/off switch, because
/// `#[repr(align(N))]` is resolved at compile time and can't be varied per
/// instance. See DESIGN.md for why the spec's runtime `Alignment` knob was
/// narrowed to this always-on form.
#[repr(align(64))]
pub struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        CachePadded(value)
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// A pointer packed together with a small integer tag in the low bits of one
/// machine word.
///
/// `BITS` is the number of tag bits (1 for the tombstone bit used by
/// MSQueue/Moir/Basket, 2 for the Ellen tree's update-descriptor state).
/// Node alignment must be at least `1 << BITS`; every node type the crate
/// allocates is `Box`-allocated, so the platform's default `Box` alignment
/// (at least 8 on 64-bit targets) is always sufficient for `BITS <= 2`.
#[derive(Debug)]
pub struct TaggedPtr<T, const BITS: u32> {
    data: usize,
    _marker: PhantomData<*mut T>,
}

impl<T, const BITS: u32> Clone for TaggedPtr<T, BITS> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T, const BITS: u32> Copy for TaggedPtr<T, BITS> {}

impl<T, const BITS: u32> PartialEq for TaggedPtr<T, BITS> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
impl<T, const BITS: u32> Eq for TaggedPtr<T, BITS> {}

const fn tag_mask(bits: u32) -> usize {
    (1usize << bits) - 1
}

impl<T, const BITS: u32> TaggedPtr<T, BITS> {
    /// Build a tagged pointer from a raw pointer and a tag. The tag is
    /// truncated to `BITS` bits; the pointer's low `BITS` bits are assumed to
    /// be zero (caller's alignment responsibility).
    #[inline]
    pub fn new(ptr: *mut T, tag: usize) -> Self {
        let addr = ptr as usize;
        debug_assert_eq!(addr & tag_mask(BITS), 0, "pointer is under-aligned for this tag width");
        TaggedPtr {
            data: addr | (tag & tag_mask(BITS)),
            _marker: PhantomData,
        }
    }

    /// The null tagged pointer with a zero tag.
    #[inline]
    pub const fn null() -> Self {
        TaggedPtr { data: 0, _marker: PhantomData }
    }

    /// The raw pointer component, with the tag bits masked off.
    #[inline]
    pub fn ptr(self) -> *mut T {
        (self.data & !tag_mask(BITS)) as *mut T
    }

    /// The tag component.
    #[inline]
    pub fn tag(self) -> usize {
        self.data & tag_mask(BITS)
    }

    /// `true` iff the pointer component is null (tag is ignored).
    #[inline]
    pub fn is_null(self) -> bool {
        self.ptr().is_null()
    }

    /// Same pointer, new tag.
    #[inline]
    pub fn with_tag(self, tag: usize) -> Self {
        Self::new(self.ptr(), tag)
    }

    #[inline]
    fn to_usize(self) -> usize {
        self.data
    }

    #[inline]
    fn from_usize(data: usize) -> Self {
        TaggedPtr { data, _marker: PhantomData }
    }
}

/// An atomic [`TaggedPtr`], storing the packed word in an `AtomicUsize`.
pub struct AtomicTaggedPtr<T, const BITS: u32> {
    inner: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T, const BITS: u32> Send for AtomicTaggedPtr<T, BITS> {}
unsafe impl<T, const BITS: u32> Sync for AtomicTaggedPtr<T, BITS> {}

impl<T, const BITS: u32> AtomicTaggedPtr<T, BITS> {
    /// Construct from an initial value.
    #[inline]
    pub fn new(value: TaggedPtr<T, BITS>) -> Self {
        AtomicTaggedPtr { inner: AtomicUsize::new(value.to_usize()), _marker: PhantomData }
    }

    /// Load with the given ordering.
    #[inline]
    pub fn load(&self, order: Ordering) -> TaggedPtr<T, BITS> {
        TaggedPtr::from_usize(self.inner.load(order))
    }

    /// Store with the given ordering.
    #[inline]
    pub fn store(&self, value: TaggedPtr<T, BITS>, order: Ordering) {
        self.inner.store(value.to_usize(), order);
    }

    /// Compare-and-exchange (strong).
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<T, BITS>,
        new: TaggedPtr<T, BITS>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T, BITS>, TaggedPtr<T, BITS>> {
        self.inner
            .compare_exchange(current.to_usize(), new.to_usize(), success, failure)
            .map(TaggedPtr::from_usize)
            .map_err(TaggedPtr::from_usize)
    }

    /// Compare-and-exchange (weak; may spuriously fail, intended for CAS loops).
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TaggedPtr<T, BITS>,
        new: TaggedPtr<T, BITS>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T, BITS>, TaggedPtr<T, BITS>> {
        self.inner
            .compare_exchange_weak(current.to_usize(), new.to_usize(), success, failure)
            .map(TaggedPtr::from_usize)
            .map_err(TaggedPtr::from_usize)
    }
}
