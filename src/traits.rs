//! Runtime-configurable policy, resolved at construction time.
//!
//! libcds expresses these as C++ template policy parameters. Rust's trait
//! system already makes the type-level choices (`compare`, `less`, `hash`,
//! `disposer`) static information carried by generic bounds, so only the
//! genuinely runtime-tunable knobs are collected here: back-off strategy,
//! memory model, statistics, and item counting. Cache-line alignment is
//! deliberately not among them; see the note on [`QueueTraits`] for why. See
//! DESIGN.md for the full rationale behind this split.

use std::sync::atomic::Ordering;

use crate::backoff::BackoffKind;

/// Whether every public load/store uses the relaxed discipline described in
/// `atomic.rs`, or is upgraded uniformly to `SeqCst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryModel {
    /// Acquire/Release/AcqRel/Relaxed as specified per operation (default,
    /// fastest).
    #[default]
    Relaxed,
    /// Every public atomic access becomes `SeqCst`. Slower, strictly
    /// stronger; useful when reasoning about cross-structure ordering that
    /// the per-operation orderings don't otherwise guarantee.
    SequentialConsistent,
}

impl MemoryModel {
    /// Resolve `base` (the per-operation ordering a queue/tree call site
    /// would use under [`MemoryModel::Relaxed`]) against this model: `base`
    /// unchanged under `Relaxed`, `SeqCst` uniformly under
    /// `SequentialConsistent`. Every head/tail/node atomic access in the
    /// queue family and the tree goes through this instead of a bare
    /// `Ordering` literal so `with_memory_model(SequentialConsistent)` is a
    /// real, crate-wide upgrade rather than a stored, unread field.
    pub(crate) fn resolve(self, base: Ordering) -> Ordering {
        match self {
            MemoryModel::Relaxed => base,
            MemoryModel::SequentialConsistent => Ordering::SeqCst,
        }
    }
}

/// Whether `size()` is tracked with an atomic exact counter or left
/// approximate (traversal-based or always zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemCounter {
    /// No dedicated counter; `size()` returns 0 for structures where an
    /// exact count would require a full traversal.
    #[default]
    None,
    /// An atomic counter updated on every successful insert/remove; `size()`
    /// is O(1) and exact.
    Atomic,
}

/// Whether operations record statistics.
///
/// Counters are always backed by cheap `Relaxed` atomics (see `stat.rs`), so
/// "off" only changes what `statistics()` promises callers about relevance,
/// not whether the fields exist. See DESIGN.md for why this crate does not
/// reproduce libcds's zero-overhead compiled-out stat policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stat {
    /// Counters are recorded but not considered part of the documented
    /// contract.
    #[default]
    Off,
    /// Counters are recorded and considered a stable part of the contract.
    On,
}

/// Head/tail cache-line separation is *not* a field here: unlike
/// `back_off`/`memory_model`/`stat`/`item_counter`, which are genuine runtime
/// choices a call site reads on every operation, cache-line padding is a
/// `#[repr(align(N))]` decision the compiler resolves once, at the type's
/// definition — it cannot be switched per-instance by a value stored in
/// `self`. A field here would be read nowhere, exactly the disguised no-op
/// knob this struct's other fields are not. Every queue in this crate instead
/// wraps its `head`/`tail` cursor in [`crate::atomic::CachePadded`]
/// unconditionally, matching the teacher's own always-on
/// `concurrency::types::CoreLocal`/`concurrency::queues::WorkQueue`
/// `#[repr(align(N))]` usage, neither of which is runtime-configurable
/// either. See DESIGN.md for the narrowing this represents from the
/// distilled spec's runtime `alignment` knob.
///
/// Runtime configuration shared by every queue type.
#[derive(Debug, Clone, Copy)]
pub struct QueueTraits {
    /// CAS retry back-off.
    pub back_off: BackoffKind,
    /// Memory ordering discipline.
    pub memory_model: MemoryModel,
    /// Statistics recording.
    pub stat: Stat,
    /// Exact vs. approximate `size()`.
    pub item_counter: ItemCounter,
}

impl Default for QueueTraits {
    fn default() -> Self {
        QueueTraits {
            back_off: BackoffKind::default(),
            memory_model: MemoryModel::default(),
            stat: Stat::default(),
            item_counter: ItemCounter::default(),
        }
    }
}

impl QueueTraits {
    /// Builder: override the back-off strategy.
    pub fn with_back_off(mut self, back_off: BackoffKind) -> Self {
        self.back_off = back_off;
        self
    }

    /// Builder: override the memory model.
    pub fn with_memory_model(mut self, memory_model: MemoryModel) -> Self {
        self.memory_model = memory_model;
        self
    }

    /// Builder: override statistics recording.
    pub fn with_stat(mut self, stat: Stat) -> Self {
        self.stat = stat;
        self
    }

    /// Builder: override item counter mode.
    pub fn with_item_counter(mut self, item_counter: ItemCounter) -> Self {
        self.item_counter = item_counter;
        self
    }
}

/// Runtime configuration shared by tree/set structures; extends
/// [`QueueTraits`]'s knobs with nothing additional at the struct-field level
/// because `compare`/`less` are expressed as the tree's generic `Ord` bound
/// rather than a runtime value (see module docs).
pub type TreeTraits = QueueTraits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain_overrides_fields() {
        let t = QueueTraits::default()
            .with_memory_model(MemoryModel::SequentialConsistent)
            .with_item_counter(ItemCounter::Atomic);
        assert_eq!(t.memory_model, MemoryModel::SequentialConsistent);
        assert_eq!(t.item_counter, ItemCounter::Atomic);
    }

    #[test]
    fn defaults_match_spec_recommendations() {
        let t = QueueTraits::default();
        assert_eq!(t.memory_model, MemoryModel::Relaxed);
        assert_eq!(t.stat, Stat::Off);
    }

    #[test]
    fn resolve_passes_base_through_under_relaxed_and_upgrades_under_sequential_consistent() {
        assert_eq!(MemoryModel::Relaxed.resolve(Ordering::Acquire), Ordering::Acquire);
        assert_eq!(MemoryModel::Relaxed.resolve(Ordering::Release), Ordering::Release);
        assert_eq!(MemoryModel::SequentialConsistent.resolve(Ordering::Acquire), Ordering::SeqCst);
        assert_eq!(MemoryModel::SequentialConsistent.resolve(Ordering::Relaxed), Ordering::SeqCst);
    }
}
