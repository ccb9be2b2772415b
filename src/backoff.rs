//! CAS retry back-off strategies.
//!
//! A [`Backoff`] is constructed once per call site (typically right before a
//! CAS retry loop) and its [`Backoff::step`] is invoked on every failed
//! attempt. `Exponential` doubles its delay up to a cap and resets whenever
//! the caller reports success via [`Backoff::reset`].

use std::thread;

/// A back-off strategy selector, resolved at construction time (see
/// `traits::QueueTraits::back_off`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// No pause at all; spin as fast as possible.
    None,
    /// A single `core::hint::spin_loop()` hint per step.
    Pause,
    /// Yield the OS thread per step.
    Yield,
    /// Spin for a doubling number of iterations, capped, then yield.
    Exponential {
        /// Initial spin count.
        min: u32,
        /// Spin count ceiling.
        max: u32,
    },
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::Exponential { min: 4, max: 1024 }
    }
}

/// Per-call-site back-off state. Not `Sync`/`Send` across uses that expect
/// independent retry counters — construct a fresh one per loop.
pub struct Backoff {
    kind: BackoffKind,
    current: u32,
}

impl Backoff {
    /// Construct a new back-off in its initial state.
    pub fn new(kind: BackoffKind) -> Self {
        let current = match kind {
            BackoffKind::Exponential { min, .. } => min,
            _ => 0,
        };
        Backoff { kind, current }
    }

    /// Perform one back-off step. May spin, yield, or do nothing depending
    /// on the configured strategy; `Yield` and `Exponential` may reschedule
    /// the calling thread.
    #[inline]
    pub fn step(&mut self) {
        match self.kind {
            BackoffKind::None => {}
            BackoffKind::Pause => std::hint::spin_loop(),
            BackoffKind::Yield => thread::yield_now(),
            BackoffKind::Exponential { max, .. } => {
                for _ in 0..self.current {
                    std::hint::spin_loop();
                }
                if self.current >= max {
                    thread::yield_now();
                } else {
                    self.current = (self.current * 2).min(max);
                }
            }
        }
    }

    /// Reset the internal delay counter after a successful CAS, so the next
    /// contention episode starts from the minimum delay again.
    #[inline]
    pub fn reset(&mut self) {
        if let BackoffKind::Exponential { min, .. } = self.kind {
            self.current = min;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(BackoffKind::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_backoff_does_not_panic() {
        let mut b = Backoff::new(BackoffKind::None);
        for _ in 0..10 {
            b.step();
        }
    }

    #[test]
    fn exponential_caps_and_resets() {
        let mut b = Backoff::new(BackoffKind::Exponential { min: 1, max: 4 });
        for _ in 0..10 {
            b.step();
        }
        assert_eq!(b.current, 4);
        b.reset();
        assert_eq!(b.current, 1);
    }

    #[test]
    fn pause_and_yield_run() {
        Backoff::new(BackoffKind::Pause).step();
        Backoff::new(BackoffKind::Yield).step();
    }
}
