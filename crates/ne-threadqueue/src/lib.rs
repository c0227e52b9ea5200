//! Generic bounded producer/consumer thread-pool primitive, independent of
//! the erasure code. [`crate::callbacks::Callbacks`] is the seam the I/O
//! threads (`ne-core`) plug into; everything about HALT/FINISH/ABORT,
//! pause/resume, and FIFO ordering lives here.

mod callbacks;
mod error;
mod flags;
mod queue;
mod status;

pub use callbacks::{Callbacks, WorkSignal};
pub use error::{Result, ThreadQueueError};
pub use flags::{ControlFlags, Signal};
pub use queue::ThreadQueue;
pub use status::{Role, ThreadStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        produced: AtomicUsize,
        limit: usize,
    }

    struct CountingProducer;

    impl Callbacks for CountingProducer {
        type State = Counting;
        type Work = usize;

        fn produce(&self, state: &Self::State) -> (Option<usize>, WorkSignal) {
            let n = state.produced.fetch_add(1, Ordering::SeqCst);
            if n >= state.limit {
                (None, WorkSignal::Finish)
            } else {
                (Some(n), WorkSignal::Continue)
            }
        }
    }

    #[test]
    fn producer_pool_feeds_master_consumer_in_order_per_producer() {
        let tq = ThreadQueue::start(
            1,
            1,
            4,
            CountingProducer,
            Counting {
                produced: AtomicUsize::new(0),
                limit: 20,
            },
        );
        let mut got = Vec::new();
        while let Some(item) = tq.dequeue(false) {
            got.push(item);
        }
        assert_eq!(got, (0..20).collect::<Vec<_>>());
        let warned = tq.wait_for_completion();
        assert!(!warned);
        assert_eq!(tq.next_thread_status(), Some((Role::Producer, ThreadStatus::Terminated)));
        assert_eq!(tq.next_thread_status(), None);
    }

    struct SummingConsumer;

    impl Callbacks for SummingConsumer {
        type State = AtomicUsize;
        type Work = usize;

        fn consume(&self, state: &Self::State, work: usize) -> WorkSignal {
            state.fetch_add(work, Ordering::SeqCst);
            WorkSignal::Continue
        }
    }

    #[test]
    fn master_producer_feeds_consumer_pool() {
        let tq = ThreadQueue::start(2, 0, 4, SummingConsumer, AtomicUsize::new(0));
        for i in 1..=10 {
            assert!(tq.enqueue(false, i));
        }
        tq.set_finish();
        let warned = tq.wait_for_completion();
        assert!(!warned, "pool has both producers(master) and consumers, not a structural deadlock shape");
        let mut total = 0;
        while let Some((_, status)) = tq.next_thread_status() {
            assert_eq!(status, ThreadStatus::Terminated);
            total += 1;
        }
        assert_eq!(total, 2);
        assert_eq!(tq.state().load(Ordering::SeqCst), 55);
    }

    struct HaltingProducer {
        calls: AtomicUsize,
    }

    impl Callbacks for HaltingProducer {
        type State = AtomicUsize;
        type Work = u8;

        fn produce(&self, state: &Self::State) -> (Option<u8>, WorkSignal) {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            state.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                (None, WorkSignal::Halt)
            } else {
                (None, WorkSignal::Finish)
            }
        }
    }

    #[test]
    fn halt_pauses_and_resume_continues() {
        let tq = ThreadQueue::start(1, 1, 4, HaltingProducer { calls: AtomicUsize::new(0) }, AtomicUsize::new(0));
        tq.wait_for_pause();
        assert_eq!(tq.active_signal(), Signal::Halt);
        tq.clear_halt();
        // After resuming, the producer calls produce() once more and signals Finish.
        let warned = tq.wait_for_completion();
        assert!(!warned);
        assert_eq!(tq.state().load(Ordering::SeqCst), 2);
    }

    struct AbortingConsumer;

    impl Callbacks for AbortingConsumer {
        type State = ();
        type Work = u8;

        fn consume(&self, _state: &Self::State, _work: u8) -> WorkSignal {
            WorkSignal::Abort
        }
    }

    #[test]
    fn abort_terminates_without_consuming_further() {
        let tq = ThreadQueue::start(1, 0, 4, AbortingConsumer, ());
        assert!(tq.enqueue(false, 1));
        assert!(tq.enqueue(false, 2));
        tq.wait_for_completion();
        assert_eq!(tq.next_thread_status(), Some((Role::Consumer, ThreadStatus::Aborted)));
    }
}
