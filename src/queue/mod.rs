//! The queue family (L6): seven concurrent FIFO/quasi-FIFO structures
//! sharing the tagged-pointer and SMR substrate below them.
//!
//! Unbounded, linked-list queues ([`MsQueue`], [`MoirQueue`],
//! [`OptimisticQueue`], [`BasketQueue`]) are generic over a
//! [`crate::smr::Reclaim`] strategy, defaulting to
//! [`crate::smr::HazardPointer`]. Bounded, fixed-capacity ring queues
//! ([`TsigasCycleQueue`], `VyukovMpmcCycleQueue`, [`WeakRingBuffer`]) never
//! free a node mid-flight — each slot is reused in place — so they need no
//! reclamation strategy at all.

mod basket;
mod moir;
mod ms;
mod optimistic;
mod spsc;
mod tsigas;
mod vyukov;

pub use basket::BasketQueue;
pub use moir::MoirQueue;
pub use ms::MsQueue;
pub use optimistic::OptimisticQueue;
pub use spsc::{WeakRingBuffer, MIN_CAPACITY};
pub use tsigas::TsigasCycleQueue;
pub use vyukov::VyukovMpmcCycleQueue;
