//! Per-thread final state, collected by [`crate::ThreadQueue::next_thread_status`].

/// The role a thread plays in a [`crate::ThreadQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// How a thread's main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Finished cleanly (FINISH signal, drained, or the producer/consumer
    /// callback returned a terminal signal on its own).
    Terminated,
    /// Ended via ABORT.
    Aborted,
    /// The `init` callback failed; the thread never entered its work loop.
    InitFailed,
}
