//! Error taxonomy.
//!
//! Only genuine failures are modeled as [`CoreError`] variants. Structural
//! outcomes that are a normal part of operating these structures —
//! `Empty`/`Full` on bounded pop/push, `NotFound`/`AlreadyPresent` on
//! tree/set membership — are returned as `Option`/`bool`, never as an error
//! variant. Contention is never surfaced to a caller either: it is handled
//! internally by a CAS retry loop with a [`crate::backoff::Backoff`].

use thiserror::Error;

/// Crate-wide result alias for the handful of operations that can genuinely
/// fail (currently: anything that allocates).
pub type CoreResult<T> = Result<T, CoreError>;

/// Genuine failure outcomes. See module docs for why `Empty`/`Full`/
/// `NotFound`/`AlreadyPresent` are intentionally absent from this enum.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node or update-descriptor allocation returned null/failed. The data
    /// structure is left in a consistent state with no partial insertion.
    #[error("allocation failed while attempting a structural update")]
    AllocatorFailure,
}

/// A thread invoked a core operation without having called `attach()`
/// first. This is a programmer error, not a recoverable condition: the core
/// logs and aborts via panic rather than returning a `Result`, because there
/// is no well-defined state to return to.
#[track_caller]
pub fn thread_not_attached() -> ! {
    tracing::error!("core operation invoked from a thread that never called attach()");
    panic!("knhk-concurrent: thread is not attached to the SMR registry; call Reclaim::attach() on this thread first");
}

/// A guard requested more simultaneous hazard-pointer protections than the
/// SMR was configured for. Programmer error; fatal by the same reasoning as
/// [`thread_not_attached`].
#[track_caller]
pub fn hazard_slot_exhausted() -> ! {
    tracing::error!("hazard pointer slot pool exhausted for this guard");
    panic!("knhk-concurrent: requested more simultaneous hazard-pointer protections than HAZARD_COUNT allows");
}
