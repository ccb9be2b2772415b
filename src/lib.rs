//! Lock-free and wait-free concurrent data structures.
//!
//! This crate provides the hard core of a concurrent-data-structure library:
//! a pluggable safe memory reclamation (SMR) substrate and the queue family
//! built on top of it, plus the Ellen binary search tree as the one non-queue
//! structure that shares the same reclamation machinery.
//!
//! # Layers
//!
//! ```text
//! atomic      : tagged pointers, ordering helpers               (L0)
//! backoff     : CAS retry backoff strategies                    (L1)
//! smr         : ThreadContext registry, Hazard Pointer, Deferred (L2/L3a/L3b)
//! hooks       : intrusive link fields, disposer contract         (L4)
//! update_desc : pooled multi-step update descriptors             (L5)
//! queue       : MSQueue, MoirQueue, Optimistic, Basket, Tsigas,
//!               Vyukov, SPSC ring buffer                         (L6)
//! tree        : Ellen binary search tree                         (L7)
//! adapter     : value-type wrappers over the intrusive core      (L8)
//! ```
//!
//! Every public structure is generic over a [`smr::Reclaim`] strategy so the
//! same algorithm can run under Hazard Pointers, Deferred/epoch reclamation,
//! or (for single-threaded use) no reclamation at all.
//!
//! # Example
//!
//! ```
//! use knhk_concurrent::queue::MsQueue;
//!
//! let q: MsQueue<u32> = MsQueue::new();
//! q.push(1);
//! q.push(2);
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.pop(), Some(2));
//! assert_eq!(q.pop(), None);
//! ```

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod adapter;
pub mod atomic;
pub mod backoff;
pub mod error;
pub mod hooks;
pub mod queue;
pub mod smr;
pub mod stat;
pub mod traits;
pub mod tree;
pub mod update_desc;

pub use error::{CoreError, CoreResult};
pub use smr::{DeferredHazard, HazardPointer, NoReclaim, Reclaim};
