//! The `{HALT, FINISH, ABORT}` control-flag set.
//!
//! Represented as an idempotent bit set with strict priority `ABORT > FINISH >
//! HALT`: [`ControlFlags::active_signal`] is what a thread's main loop should
//! act on, and it always resolves to the highest-priority bit currently set,
//! regardless of how many lower-priority bits also happen to be set.

use parking_lot::{Condvar, Mutex};

const HALT: u8 = 0b001;
const FINISH: u8 = 0b010;
const ABORT: u8 = 0b100;

/// The signal a thread's main loop should act on right now, already resolved
/// for priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// No control flag is set; keep running normally.
    None,
    /// Cooperative pause: call the `pause` callback, sleep, resume on wake.
    Halt,
    /// Drain remaining work, then terminate (consumers wait for producers).
    Finish,
    /// Finish the in-flight work item, then terminate without consuming more.
    Abort,
}

/// Shared, lock-guarded control-flag word plus its condition variable.
///
/// A `Mutex<u8>` rather than a bare `AtomicU8` because every flag mutation must
/// be immediately visible to a thread blocked in [`ControlFlags::wait_for`] —
/// `parking_lot`'s condvar needs a guard to park against, so the flags live
/// behind the same lock it waits on.
#[derive(Default)]
pub struct ControlFlags {
    bits: Mutex<u8>,
    changed: Condvar,
}

impl ControlFlags {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    /// Sets `halt`/`finish`/`abort` idempotently and wakes every thread
    /// blocked on a flag-related wait.
    pub fn set(&self, halt: bool, finish: bool, abort: bool) {
        let mut bits = self.bits.lock();
        if halt {
            *bits |= HALT;
        }
        if finish {
            *bits |= FINISH;
        }
        if abort {
            *bits |= ABORT;
        }
        drop(bits);
        self.changed.notify_all();
    }

    pub fn set_halt(&self) {
        self.set(true, false, false);
    }

    pub fn set_finish(&self) {
        self.set(false, true, false);
    }

    pub fn set_abort(&self) {
        self.set(false, false, true);
    }

    /// Clears `HALT` only — resuming from a pause never clears `FINISH`/`ABORT`,
    /// since those are one-way terminal signals.
    pub fn clear_halt(&self) {
        let mut bits = self.bits.lock();
        *bits &= !HALT;
        drop(bits);
        self.changed.notify_all();
    }

    #[must_use]
    pub fn raw(&self) -> u8 {
        *self.bits.lock()
    }

    /// Resolves the current bits to the single signal a thread should act on,
    /// applying `ABORT > FINISH > HALT` priority.
    #[must_use]
    pub fn active_signal(&self) -> Signal {
        Self::resolve(self.raw())
    }

    /// Resolves a raw bit word to the signal a thread should act on, applying
    /// `ABORT > FINISH > HALT` priority. Exposed so callers blocked in
    /// [`Self::wait_for`] can test a candidate bit word without a `&self`.
    #[must_use]
    pub fn resolve(bits: u8) -> Signal {
        if bits & ABORT != 0 {
            Signal::Abort
        } else if bits & FINISH != 0 {
            Signal::Finish
        } else if bits & HALT != 0 {
            Signal::Halt
        } else {
            Signal::None
        }
    }

    /// Blocks until `predicate` holds for the current raw bits, or forever if
    /// it never does (callers are expected to pair this with flags that are
    /// monotone for their use case).
    pub fn wait_for(&self, mut predicate: impl FnMut(u8) -> bool) {
        let mut bits = self.bits.lock();
        while !predicate(*bits) {
            self.changed.wait(&mut bits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_dominates_finish_and_halt() {
        let flags = ControlFlags::new();
        flags.set_halt();
        flags.set_finish();
        flags.set_abort();
        assert_eq!(flags.active_signal(), Signal::Abort);
    }

    #[test]
    fn finish_dominates_halt() {
        let flags = ControlFlags::new();
        flags.set_halt();
        flags.set_finish();
        assert_eq!(flags.active_signal(), Signal::Finish);
    }

    #[test]
    fn clear_halt_only_clears_halt() {
        let flags = ControlFlags::new();
        flags.set_halt();
        flags.set_finish();
        flags.clear_halt();
        assert_eq!(flags.active_signal(), Signal::Finish);
    }

    #[test]
    fn setting_is_idempotent() {
        let flags = ControlFlags::new();
        flags.set_halt();
        flags.set_halt();
        assert_eq!(flags.raw(), 0b001);
    }
}
