//! [`ThreadQueue`]: the generic bounded producer/consumer thread pool.

use crate::callbacks::{Callbacks, WorkSignal};
use crate::error::{Result, ThreadQueueError};
use crate::flags::{ControlFlags, Signal};
use crate::status::{Role, ThreadStatus};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often a blocked producer/consumer rechecks control flags. Flag changes
/// only need to be visible before a thread's next condition-variable wake, so
/// this poll granularity stands in for a wake on every send/recv attempt,
/// since `crossbeam_channel` has no single primitive that selects over both
/// "flag changed" and "channel ready".
const FLAG_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct PauseTracker {
    paused: Mutex<usize>,
    changed: Condvar,
}

impl PauseTracker {
    fn new() -> Self {
        Self {
            paused: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    fn mark_paused(&self) {
        let mut n = self.paused.lock();
        *n += 1;
        drop(n);
        self.changed.notify_all();
    }

    fn mark_resumed(&self) {
        let mut n = self.paused.lock();
        *n = n.saturating_sub(1);
        drop(n);
        self.changed.notify_all();
    }

    fn wait_until(&self, target: usize) {
        let mut n = self.paused.lock();
        while *n < target {
            self.changed.wait(&mut n);
        }
    }
}

struct StatusBoard {
    entries: Mutex<Vec<(Role, ThreadStatus)>>,
}

impl StatusBoard {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, role: Role, status: ThreadStatus) {
        self.entries.lock().push((role, status));
    }
}

/// A generic bounded producer/consumer thread pool around an opaque work-item
/// FIFO, parameterized by a [`Callbacks`] implementation.
///
/// The underlying FIFO is a `crossbeam_channel` bounded channel: the "consumer
/// exits only when the queue is empty and all producers have terminated"
/// invariant falls directly out of `crossbeam_channel`'s own disconnect
/// semantics once every producer-side `Sender` is dropped.
pub struct ThreadQueue<H: Callbacks> {
    handler: Arc<H>,
    state: Arc<H::State>,
    sender: Sender<H::Work>,
    receiver: Receiver<H::Work>,
    flags: Arc<ControlFlags>,
    pause_tracker: Arc<PauseTracker>,
    running: Arc<AtomicUsize>,
    statuses: Arc<StatusBoard>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    num_producers: usize,
    num_total: usize,
}

impl<H: Callbacks> ThreadQueue<H> {
    /// Starts `num_threads` threads around a `max_qdepth`-bounded FIFO: the
    /// first `num_prod_threads` are producers, the remainder are consumers.
    pub fn start(num_threads: usize, num_prod_threads: usize, max_qdepth: usize, handler: H, state: H::State) -> Self {
        assert!(num_prod_threads <= num_threads, "num_prod_threads must not exceed num_threads");
        let (sender, receiver) = crossbeam_channel::bounded(max_qdepth.max(1));
        let handler = Arc::new(handler);
        let state = Arc::new(state);
        let flags = Arc::new(ControlFlags::new());
        let pause_tracker = Arc::new(PauseTracker::new());
        let running = Arc::new(AtomicUsize::new(num_threads));
        let statuses = Arc::new(StatusBoard::new());

        let mut threads = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let role = if i < num_prod_threads { Role::Producer } else { Role::Consumer };
            let handler = Arc::clone(&handler);
            let state = Arc::clone(&state);
            let sender = sender.clone();
            let receiver = receiver.clone();
            let flags = Arc::clone(&flags);
            let pause_tracker = Arc::clone(&pause_tracker);
            let running = Arc::clone(&running);
            let statuses = Arc::clone(&statuses);

            let join = std::thread::Builder::new()
                .name(format!("ne-tq-{role:?}-{i}"))
                .spawn(move || {
                    run_thread(role, &handler, &state, &sender, &receiver, &flags, &pause_tracker, &statuses);
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .expect("failed to spawn thread-queue worker");
            threads.push(join);
        }

        Self {
            handler,
            state,
            sender,
            receiver,
            flags,
            pause_tracker,
            running,
            statuses,
            threads: Mutex::new(threads),
            num_producers: num_prod_threads,
            num_total: num_threads,
        }
    }

    #[must_use]
    pub fn state(&self) -> &H::State {
        &self.state
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Master-as-producer: enqueues one item, blocking if the queue is full.
    /// `ignore_flags` lets a close-time drain proceed even after FINISH has
    /// been signaled.
    pub fn enqueue(&self, ignore_flags: bool, work: H::Work) -> bool {
        if !ignore_flags && self.flags.active_signal() == Signal::Abort {
            return false;
        }
        self.sender.send(work).is_ok()
    }

    /// Master-as-consumer: dequeues one item, blocking until one is available
    /// or the channel disconnects (all producers gone and queue drained).
    pub fn dequeue(&self, ignore_flags: bool) -> Option<H::Work> {
        loop {
            match self.receiver.recv_timeout(FLAG_POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {
                    if !ignore_flags && self.flags.active_signal() == Signal::Abort {
                        return None;
                    }
                }
            }
        }
    }

    /// Non-blocking dequeue; `None` if nothing is immediately available
    /// (whether or not the channel has disconnected).
    #[must_use]
    pub fn try_dequeue(&self) -> Option<H::Work> {
        self.receiver.try_recv().ok()
    }

    pub fn set_halt(&self) {
        self.flags.set_halt();
    }

    pub fn set_finish(&self) {
        self.flags.set_finish();
    }

    pub fn set_abort(&self) {
        self.flags.set_abort();
    }

    pub fn clear_halt(&self) {
        self.flags.clear_halt();
    }

    #[must_use]
    pub fn active_signal(&self) -> Signal {
        self.flags.active_signal()
    }

    /// Blocks until every currently-running thread has acknowledged HALT by
    /// calling its `pause` callback (used before a reseek).
    pub fn wait_for_pause(&self) {
        let target = self.running.load(Ordering::SeqCst);
        self.pause_tracker.wait_until(target);
    }

    /// Blocks until every thread has exited. Returns `true` as a deadlock
    /// warning when the pool's shape makes progress structurally impossible
    /// (queue full with no consumers, or queue empty with no producers) — a
    /// static property of the pool's construction, checked before joining.
    pub fn wait_for_completion(&self) -> bool {
        let probable_deadlock = self.num_producers == 0 || self.num_producers == self.num_total;
        let mut threads = self.threads.lock();
        for join in threads.drain(..) {
            let _ = join.join();
        }
        probable_deadlock
    }

    /// Pops the next collected per-thread terminal status, if any.
    #[must_use]
    pub fn next_thread_status(&self) -> Option<(Role, ThreadStatus)> {
        self.statuses.entries.lock().pop()
    }

    /// Refuses (returning an error) if thread states remain uncollected or the
    /// queue still has buffered elements; otherwise consumes the pool.
    pub fn close(self) -> Result<()> {
        let uncollected = self.statuses.entries.lock().len();
        if uncollected > 0 {
            return Err(ThreadQueueError::UncollectedStatus(uncollected));
        }
        if self.try_dequeue().is_some() {
            return Err(ThreadQueueError::NotDrained);
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn run_thread<H: Callbacks>(
    role: Role,
    handler: &H,
    state: &H::State,
    sender: &Sender<H::Work>,
    receiver: &Receiver<H::Work>,
    flags: &ControlFlags,
    pause_tracker: &PauseTracker,
    statuses: &StatusBoard,
) {
    if !handler.init(state, role) {
        statuses.push(role, ThreadStatus::InitFailed);
        return;
    }

    let status = loop {
        match flags.active_signal() {
            Signal::Abort => break ThreadStatus::Aborted,
            Signal::Halt => {
                handler.pause(state);
                pause_tracker.mark_paused();
                flags.wait_for(|bits| ControlFlags::resolve(bits) != Signal::Halt);
                pause_tracker.mark_resumed();
                handler.resume(state);
                continue;
            }
            Signal::Finish if role == Role::Producer => break ThreadStatus::Terminated,
            Signal::Finish if role == Role::Consumer && receiver.is_empty() => break ThreadStatus::Terminated,
            Signal::Finish | Signal::None => {}
        }

        let outcome = match role {
            Role::Producer => run_producer_step(handler, state, sender, flags),
            Role::Consumer => run_consumer_step(handler, state, receiver, flags),
        };

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Terminated => break ThreadStatus::Terminated,
            StepOutcome::Aborted => break ThreadStatus::Aborted,
        }
    };

    handler.term(state, role);
    statuses.push(role, status);
}

enum StepOutcome {
    Continue,
    Terminated,
    Aborted,
}

fn run_producer_step<H: Callbacks>(handler: &H, state: &H::State, sender: &Sender<H::Work>, flags: &ControlFlags) -> StepOutcome {
    let (item, signal) = handler.produce(state);
    if let Some(mut item) = item {
        loop {
            match sender.send_timeout(item, FLAG_POLL_INTERVAL) {
                Ok(()) => break,
                Err(SendTimeoutError::Disconnected(_)) => return StepOutcome::Terminated,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if flags.active_signal() == Signal::Abort {
                        return StepOutcome::Aborted;
                    }
                    item = returned;
                }
            }
        }
    }
    apply_signal(signal, flags)
}

fn run_consumer_step<H: Callbacks>(handler: &H, state: &H::State, receiver: &Receiver<H::Work>, flags: &ControlFlags) -> StepOutcome {
    loop {
        match receiver.recv_timeout(FLAG_POLL_INTERVAL) {
            Ok(item) => {
                let signal = handler.consume(state, item);
                return apply_signal(signal, flags);
            }
            Err(RecvTimeoutError::Disconnected) => return StepOutcome::Terminated,
            Err(RecvTimeoutError::Timeout) => match flags.active_signal() {
                Signal::Abort => return StepOutcome::Aborted,
                Signal::Finish if receiver.is_empty() => return StepOutcome::Terminated,
                _ => {}
            },
        }
    }
}

fn apply_signal(signal: WorkSignal, flags: &ControlFlags) -> StepOutcome {
    match signal {
        WorkSignal::Continue => StepOutcome::Continue,
        WorkSignal::Finish => {
            flags.set_finish();
            StepOutcome::Terminated
        }
        WorkSignal::Halt => {
            flags.set_halt();
            StepOutcome::Continue
        }
        WorkSignal::Abort => {
            flags.set_abort();
            StepOutcome::Aborted
        }
    }
}
