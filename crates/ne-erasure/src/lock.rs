//! The process-wide erasurelock: a singleton critical section serializing
//! erasure-table initialization and `ec_encode_data`-equivalent calls.
//!
//! This is a hard correctness requirement, not a performance knob: ISA-L-style
//! encode/decode routines mutate process-global table state, so two calls
//! racing on different threads can corrupt each other's tables even if
//! they're fed disjoint buffers. This module models it explicitly as a
//! singleton rather than "just a mutex somewhere" so every caller shares it
//! note, while still letting a caller plug in an externally-owned lock (shared
//! across multiple contexts) via [`ErasureLock::shared`].

use ne_common::config::SharedErasureLock;
use parking_lot::MutexGuard;
use std::sync::{Arc, OnceLock};

impl ErasureLock {
    /// `true` iff `self` and `other` guard the same underlying mutex.
    #[must_use]
    pub fn is_same_lock(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A handle to the erasure-table critical section. Cheaply `Clone`-able;
/// clones all guard the same underlying mutex.
#[derive(Clone)]
pub struct ErasureLock(SharedErasureLock);

static PROCESS_LOCK: OnceLock<SharedErasureLock> = OnceLock::new();

impl ErasureLock {
    /// Returns the process-wide default lock, created on first use. All
    /// `ErasureLock`s obtained this way across the process serialize with
    /// each other: a single shared lock per process is the recommended setup.
    #[must_use]
    pub fn process_wide() -> Self {
        let lock = PROCESS_LOCK
            .get_or_init(|| Arc::new(parking_lot::Mutex::new(())))
            .clone();
        Self(lock)
    }

    /// Wraps an externally-owned lock (e.g. shared across several contexts
    /// by the caller via its own `erasurelock` configuration knob).
    #[must_use]
    pub fn shared(lock: SharedErasureLock) -> Self {
        Self(lock)
    }

    /// Acquires the critical section. Every `GTables::build` plus
    /// `encode_data`/`decode_data` invocation on the resulting tables must happen
    /// while holding this guard.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_wide_lock_is_shared_across_clones() {
        let a = ErasureLock::process_wide();
        let b = ErasureLock::process_wide();
        assert!(a.is_same_lock(&b));
    }

    #[test]
    fn shared_lock_is_distinct_from_process_wide() {
        let shared = ErasureLock::shared(Arc::new(parking_lot::Mutex::new(())));
        let process_wide = ErasureLock::process_wide();
        assert!(!shared.is_same_lock(&process_wide));
    }
}
