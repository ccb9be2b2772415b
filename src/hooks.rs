//! Intrusive link-field contract and disposer callback (L4).
//!
//! libcds expresses "intrusive" via a node base class and a compile-time
//! hook policy selecting which field holds the link. This crate's queue and
//! tree nodes are concrete per-algorithm structs (`queue::ms::Node`,
//! `tree::Internal`/`tree::Leaf`, ...) rather than a generic pluggable hook,
//! matching how `concurrent::stack_queue::Node`/`concurrent::skiplist::Node`
//! hard-code their own link fields instead of routing through a trait
//! object. What *is* shared across every node type is the disposer
//! contract: a plain function pointer run exactly once, after the SMR
//! registry has proven no thread can still observe the node.

/// A disposer: reclaims the storage behind a retired node. Most nodes in
/// this crate are `Box`-allocated and use [`crate::smr::RetireEntry::for_boxed`]
/// instead, which needs no disposer at all; this type exists for intrusive
/// callers whose node storage this crate does not own.
pub type Disposer<T> = fn(*mut T);

/// The disposer for a node this crate allocated with `Box::into_raw`: drop
/// the box. Equivalent to what `RetireEntry::for_boxed` does internally,
/// exposed here for intrusive adapters that want to build their own
/// `RetireEntry` via [`crate::smr::RetireEntry::with_disposer`].
pub fn box_disposer<T>() -> Disposer<T> {
    |ptr: *mut T| unsafe { drop(Box::from_raw(ptr)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_disposer_drops_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }
        let raw = Box::into_raw(Box::new(Counted));
        let disposer = box_disposer::<Counted>();
        disposer(raw);
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }
}
