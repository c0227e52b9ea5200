//! The callback surface a [`crate::ThreadQueue`] user implements: a set of
//! callbacks plus a global-state value shared across the pool's threads.

use crate::status::Role;

/// What a `produce`/`consume` callback wants the surrounding state machine to
/// do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkSignal {
    /// Return `0`: keep running.
    Continue,
    /// Return `1`: signal FINISH.
    Finish,
    /// Return `>1`: signal HALT.
    Halt,
    /// Return `<0`: signal ABORT.
    Abort,
}

/// The callback set for one [`crate::ThreadQueue`]. A producer-role
/// implementation overrides [`Callbacks::produce`]; a consumer-role
/// implementation overrides [`Callbacks::consume`]. Both share `init`/`pause`/
/// `resume`/`term` and the shared `State`.
pub trait Callbacks: Send + Sync + 'static {
    /// Shared global state visible to every thread in the pool (e.g. the I/O
    /// thread's DAL handle, location, objID).
    type State: Send + Sync + 'static;
    /// The opaque work item type flowing through the queue (an `IoBlock` in
    /// the I/O thread use, for instance).
    type Work: Send + 'static;

    /// Runs once before a thread enters its work loop. `false` transitions the
    /// thread straight to `InitFailed` without ever calling `produce`/`consume`.
    fn init(&self, _state: &Self::State, _role: Role) -> bool {
        true
    }

    /// Producer work callback: generate (at most) one item to enqueue, plus a
    /// control signal. A producer that has nothing to enqueue this round but
    /// isn't finished yet returns `(None, WorkSignal::Continue)`.
    fn produce(&self, _state: &Self::State) -> (Option<Self::Work>, WorkSignal) {
        (None, WorkSignal::Finish)
    }

    /// Consumer work callback: process one dequeued item.
    fn consume(&self, _state: &Self::State, _work: Self::Work) -> WorkSignal {
        WorkSignal::Continue
    }

    /// Called before a thread parks on HALT.
    fn pause(&self, _state: &Self::State) {}

    /// Called after a thread wakes from HALT, before it reenters the work loop.
    fn resume(&self, _state: &Self::State) {}

    /// Called once, after a thread's work loop exits for any reason.
    fn term(&self, _state: &Self::State, _role: Role) {}
}
