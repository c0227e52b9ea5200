//! I/O thread specializations of [`ne_threadqueue::Callbacks`]: one
//! read-producer or write-consumer per shard.
//!
//! Each global-state struct carries the DAL, the target location, the objID,
//! the shared erasurelock, a mode flag (implicit in which struct is used), a
//! starting offset, the shard's meta-info, two error flags, and the shard's
//! `IoQueue`. The DAL handle itself lives behind a `Mutex` since `Callbacks`
//! methods only ever see a shared `&State` — `ne-core`'s master thread takes
//! it back out once the worker has terminated (see `Handle::close`), rather
//! than having the `term` callback itself call `set_meta`/`close`/`abort`,
//! since `term` has no visibility into *why* the loop ended whereas the
//! master does via `next_thread_status`.

use crate::wire::{append_crc, verify_framed};
use ne_common::config::SharedErasureLock;
use ne_common::{Crc32Accumulator, Location};
use ne_dal::{Dal, DalMode};
use ne_ioqueue::{IoBlock, IoQueue, Reservation};
use ne_threadqueue::{Callbacks, Role, WorkSignal};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Global state shared by a shard's read-producer thread and the master.
pub struct ReadWorkerState<D: Dal> {
    pub dal: Arc<D>,
    pub loc: Location,
    pub obj_id: String,
    pub ioqueue: Arc<IoQueue>,
    pub versz: u64,
    pub expected_blocksz: u64,
    pub expected_crcsum: u64,
    pub meta_error: AtomicBool,
    pub data_error: AtomicBool,
    /// Shard-coordinate byte offset the worker should next read from. Set by
    /// the master before a resume, read fresh by `produce` after each wake.
    pub offset: AtomicU64,
    /// Disabled once any non-zero seek touches this shard: any seek other
    /// than to offset 0 disables the summed-CRC check for the rest of the read.
    pub crc_check_enabled: AtomicBool,
    pub handle: Mutex<Option<D::Handle>>,
    current: Mutex<Option<IoBlock>>,
    running_crc: Mutex<Crc32Accumulator>,
}

impl<D: Dal> ReadWorkerState<D> {
    #[must_use]
    pub fn new(dal: Arc<D>, loc: Location, obj_id: String, ioqueue: Arc<IoQueue>, versz: u64, expected_blocksz: u64, expected_crcsum: u64) -> Self {
        Self {
            dal,
            loc,
            obj_id,
            ioqueue,
            versz,
            expected_blocksz,
            expected_crcsum,
            meta_error: AtomicBool::new(false),
            data_error: AtomicBool::new(false),
            offset: AtomicU64::new(0),
            crc_check_enabled: AtomicBool::new(true),
            handle: Mutex::new(None),
            current: Mutex::new(None),
            running_crc: Mutex::new(Crc32Accumulator::new()),
        }
    }

    /// Called by the master before clearing HALT on a seek, to reset this
    /// thread's offset to the new position.
    pub fn reset_offset(&self, new_offset: u64) {
        self.offset.store(new_offset, Ordering::SeqCst);
        self.crc_check_enabled.store(new_offset == 0, Ordering::SeqCst);
        *self.current.lock() = None;
    }

    #[must_use]
    pub fn summed_crc_ok(&self) -> bool {
        !self.crc_check_enabled.load(Ordering::SeqCst) || self.running_crc.lock().matches(self.expected_crcsum)
    }
}

pub struct ReadWorker<D: Dal>(std::marker::PhantomData<D>);

impl<D: Dal> Default for ReadWorker<D> {
    fn default() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<D: Dal> Callbacks for ReadWorker<D> {
    type State = ReadWorkerState<D>;
    type Work = IoBlock;

    fn init(&self, state: &Self::State, _role: Role) -> bool {
        match state.dal.open(DalMode::Read, state.loc, &state.obj_id) {
            Ok(h) => {
                *state.handle.lock() = Some(h);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, loc = %state.loc, "read-thread open failed, falling back to metaread");
                state.data_error.store(true, Ordering::SeqCst);
                match state.dal.open(DalMode::MetaRead, state.loc, &state.obj_id) {
                    Ok(h) => {
                        *state.handle.lock() = Some(h);
                        true
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, loc = %state.loc, "read-thread metaread fallback also failed");
                        state.meta_error.store(true, Ordering::SeqCst);
                        false
                    }
                }
            }
        }
    }

    fn produce(&self, state: &Self::State) -> (Option<IoBlock>, WorkSignal) {
        let offset = state.offset.load(Ordering::SeqCst);
        if offset >= state.expected_blocksz {
            let leftover = state.current.lock().take();
            return (leftover, WorkSignal::Finish);
        }

        let remaining = state.expected_blocksz - offset;
        let want = remaining.min(state.versz) as usize;
        let mut raw = vec![0u8; want];

        let mut handle_guard = state.handle.lock();
        let Some(handle) = handle_guard.as_mut() else {
            return (None, WorkSignal::Finish);
        };
        let got = match state.dal.get(handle, &mut raw, offset) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, offset, "read-thread get failed");
                state.data_error.store(true, Ordering::SeqCst);
                return (None, WorkSignal::Finish);
            }
        };
        drop(handle_guard);
        raw.truncate(got);
        state.offset.store(offset + got as u64, Ordering::SeqCst);

        let mut current = state.current.lock().take().unwrap_or_else(|| state.ioqueue.take_free());
        match verify_framed(&raw) {
            Some(framed) => {
                let start = current.data_size();
                current.append(framed.body);
                if framed.ok {
                    state.running_crc.lock().add(framed.stored_crc);
                } else {
                    tracing::warn!(offset, "per-buffer CRC mismatch on read");
                    state.data_error.store(true, Ordering::SeqCst);
                    current.mark_error(start + framed.body.len());
                }
            }
            None => {
                tracing::warn!(offset, got, "short read could not carry a CRC trailer");
                state.data_error.store(true, Ordering::SeqCst);
                current.mark_error(current.data_size());
            }
        }

        // A short read (fewer bytes than requested) means the backing shard
        // physically has no more data, regardless of what the consensus meta
        // expected — truncation/corruption can make a shard end early. Without
        // this, a zero-length shard would never advance its offset and this
        // producer would spin forever without ever reaching `Finish`.
        let short_read = got < want;
        let at_end = short_read || offset + got as u64 >= state.expected_blocksz;
        let reservation = state.ioqueue.reserve(Some(current));
        match reservation {
            Reservation::Rotated { full, fresh } => {
                *state.current.lock() = Some(fresh);
                (Some(full), if at_end { WorkSignal::Finish } else { WorkSignal::Continue })
            }
            Reservation::Filling(block) => {
                if at_end {
                    (Some(block), WorkSignal::Finish)
                } else {
                    *state.current.lock() = Some(block);
                    (None, WorkSignal::Continue)
                }
            }
        }
    }

    fn pause(&self, _state: &Self::State) {
        tracing::trace!("read worker pausing");
    }

    fn resume(&self, _state: &Self::State) {
        tracing::trace!("read worker resuming");
    }

    fn term(&self, state: &Self::State, _role: Role) {
        if !state.summed_crc_ok() {
            tracing::warn!(loc = %state.loc, "summed CRC mismatch on full read");
            state.data_error.store(true, Ordering::SeqCst);
        }
    }
}

/// Global state shared by a shard's write-consumer thread and the master.
pub struct WriteWorkerState<D: Dal> {
    pub dal: Arc<D>,
    pub loc: Location,
    pub obj_id: String,
    pub mode: DalMode,
    pub lock: SharedErasureLock,
    pub data_error: AtomicBool,
    pub handle: Mutex<Option<D::Handle>>,
    pub crc_accumulator: Mutex<Crc32Accumulator>,
    /// Bytes actually committed to the backend (framed, so including each
    /// buffer's 4-byte CRC trailer) — populates this shard's `blocksz` in the
    /// final `set_meta` call at close/rebuild time.
    pub bytes_written: AtomicU64,
}

impl<D: Dal> WriteWorkerState<D> {
    #[must_use]
    pub fn new(dal: Arc<D>, loc: Location, obj_id: String, mode: DalMode, lock: SharedErasureLock) -> Self {
        Self {
            dal,
            loc,
            obj_id,
            mode,
            lock,
            data_error: AtomicBool::new(false),
            handle: Mutex::new(None),
            crc_accumulator: Mutex::new(Crc32Accumulator::new()),
            bytes_written: AtomicU64::new(0),
        }
    }
}

pub struct WriteWorker<D: Dal>(std::marker::PhantomData<D>);

impl<D: Dal> Default for WriteWorker<D> {
    fn default() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<D: Dal> Callbacks for WriteWorker<D> {
    type State = WriteWorkerState<D>;
    type Work = IoBlock;

    fn init(&self, state: &Self::State, _role: Role) -> bool {
        match state.dal.open(state.mode, state.loc, &state.obj_id) {
            Ok(h) => {
                *state.handle.lock() = Some(h);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, loc = %state.loc, "write-thread open failed");
                state.data_error.store(true, Ordering::SeqCst);
                // Keep running: the handle must still be closeable cleanly,
                // so this thread just drains and discards.
                true
            }
        }
    }

    fn consume(&self, state: &Self::State, work: IoBlock) -> WorkSignal {
        if state.data_error.load(Ordering::SeqCst) {
            return WorkSignal::Continue;
        }

        let crc = {
            let _guard = state.lock.lock();
            let mut framed = Vec::with_capacity(work.data_size() + 4);
            let crc = append_crc(&mut framed, work.data());
            let mut handle_guard = state.handle.lock();
            let Some(handle) = handle_guard.as_mut() else {
                state.data_error.store(true, Ordering::SeqCst);
                return WorkSignal::Continue;
            };
            if let Err(err) = state.dal.put(handle, &framed) {
                tracing::warn!(error = %err, loc = %state.loc, "write-thread put failed");
                state.data_error.store(true, Ordering::SeqCst);
                return WorkSignal::Continue;
            }
            state.bytes_written.fetch_add(framed.len() as u64, Ordering::SeqCst);
            crc
        };
        state.crc_accumulator.lock().add(crc);
        WorkSignal::Continue
    }

    fn term(&self, state: &Self::State, _role: Role) {
        tracing::trace!(loc = %state.loc, error = state.data_error.load(Ordering::SeqCst), "write worker terminated");
    }
}
