//! [`Handle`]: an open reference to a single object in a single mode.

use crate::consensus;
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::worker::{ReadWorker, ReadWorkerState, WriteWorker, WriteWorkerState};
use ne_common::{ErasurePattern, HandleMode, Location};
use ne_dal::{Dal, DalMode};
use ne_erasure::ErasureCodec;
use ne_ioqueue::{IoBlock, IoMode, IoQueue, Reservation, SUPER_BLOCK_CNT};
use ne_meta::MetaInfo;
use ne_threadqueue::ThreadQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ShardReader<D: Dal> {
    tq: ThreadQueue<ReadWorker<D>>,
    ioqueue: Arc<IoQueue>,
}

struct ShardWriter<D: Dal> {
    tq: ThreadQueue<WriteWorker<D>>,
    ioqueue: Arc<IoQueue>,
    current: Mutex<Option<IoBlock>>,
}

struct ReadCursor {
    /// Per-shard `(held block, position already consumed within it)`.
    held: Vec<Option<(IoBlock, usize)>>,
    logical_offset: u64,
    active_width: usize,
    /// Per-shard logical bytes to skip the next time a fresh block is
    /// dequeued for that shard — set by a seek or a ramp-up activation that
    /// repositioned the worker mid-buffer, consumed exactly once.
    pending_skip: Vec<usize>,
}

struct WriteCursor {
    stripe_buf: Vec<u8>,
    totsz: u64,
}

/// An open reference to a single object, in a single mode, for the life of
/// one DAL session. Generic over the backend so `ne-core` never depends on a
/// concrete DAL implementation.
pub struct Handle<D: Dal> {
    ctx: Arc<Context<D>>,
    obj_id: String,
    base_loc: Location,
    mode: HandleMode,
    pattern: ErasurePattern,
    consensus: MetaInfo,
    codec: ErasureCodec,
    readers: Vec<ShardReader<D>>,
    writers: Vec<ShardWriter<D>>,
    rebuild_writers: Vec<Option<ShardWriter<D>>>,
    /// Per-shard damaged flag: set at open (meta disagreement / open failure)
    /// and kept current as worker error flags are observed.
    damaged: Vec<AtomicBool>,
    read_cursor: Mutex<ReadCursor>,
    write_cursor: Mutex<WriteCursor>,
}

/// What `Handle::close` reports: the surviving per-shard error count.
#[derive(Debug, Clone, Copy)]
pub struct CloseReport {
    pub errors: usize,
}

impl<D: Dal> Handle<D> {
    #[must_use]
    pub fn mode(&self) -> HandleMode {
        self.mode
    }

    #[must_use]
    pub fn pattern(&self) -> ErasurePattern {
        self.pattern
    }

    #[must_use]
    pub fn consensus(&self) -> MetaInfo {
        self.consensus
    }

    #[must_use]
    pub fn totsz(&self) -> u64 {
        self.consensus.totsz.max(0) as u64
    }

    fn total_parts(&self) -> usize {
        self.pattern.total_parts() as usize
    }

    fn loc_for(&self, shard: usize) -> Location {
        self.base_loc.with_block(self.pattern.block_for(shard as u32))
    }

    // ---- open (read family + STAT) -------------------------------------

    /// Performs the `STAT` pass (probing up to `ctx.config().max_block`
    /// candidate shards), resolves consensus meta, and — for every mode but
    /// [`HandleMode::Stat`] — spins up one read-producer `ThreadQueue` per
    /// shard.
    #[tracing::instrument(skip(ctx, obj_id))]
    pub fn open(ctx: Arc<Context<D>>, mode: HandleMode, obj_id: impl Into<String>, base_loc: Location) -> Result<Self> {
        let obj_id = obj_id.into();
        let probe_width = (ctx.config().max_block as usize).min(ne_common::MAXPARTS);

        let mut readings: Vec<Option<MetaInfo>> = Vec::with_capacity(probe_width);
        for i in 0..probe_width {
            let loc = base_loc.with_block(i as u32);
            readings.push(Self::probe_meta(&ctx, loc, &obj_id));
        }

        let resolved = consensus::resolve(&readings, ctx.consensus().max_meta_consensus_sample)?;
        let pattern = ErasurePattern::new(resolved.n as u32, resolved.e as u32, resolved.o as u32, resolved.partsz as u32)?;
        let total = pattern.total_parts() as usize;

        let mut damaged = Vec::with_capacity(total);
        for i in 0..total {
            let agrees = readings.get(i).copied().flatten().is_some_and(|m| m.matches(&resolved));
            damaged.push(AtomicBool::new(!agrees));
        }

        if mode == HandleMode::Stat {
            return Ok(Self {
                ctx,
                obj_id,
                base_loc,
                mode,
                pattern,
                consensus: resolved,
                codec: ErasureCodec::with_lock(pattern.n as usize, pattern.e as usize, ctx_lock_placeholder()),
                readers: Vec::new(),
                writers: Vec::new(),
                rebuild_writers: Vec::new(),
                damaged,
                read_cursor: Mutex::new(ReadCursor {
                    held: Vec::new(),
                    logical_offset: 0,
                    active_width: 0,
                    pending_skip: Vec::new(),
                }),
                write_cursor: Mutex::new(WriteCursor {
                    stripe_buf: Vec::new(),
                    totsz: 0,
                }),
            });
        }

        let codec = ErasureCodec::with_lock(pattern.n as usize, pattern.e as usize, ctx.codec_lock());
        let active_width = mode.initial_read_width(pattern.n, pattern.e) as usize;
        let versz = resolved.versz.max(0) as u64;
        let blocksz = resolved.blocksz.max(0) as u64;
        let crcsum = resolved.crcsum as u64;

        let mut readers = Vec::with_capacity(total);
        for i in 0..total {
            let loc = base_loc.with_block(pattern.block_for(i as u32));
            let ioqueue = Arc::new(IoQueue::create(versz as usize, pattern.partsz as usize, IoMode::Read)?);
            let state = ReadWorkerState::new(Arc::clone(ctx.dal()), loc, obj_id.clone(), Arc::clone(&ioqueue), versz, blocksz, crcsum);
            let tq = ThreadQueue::start(1, 1, SUPER_BLOCK_CNT, ReadWorker::default(), state);
            if i >= active_width {
                tq.set_halt();
            }
            readers.push(ShardReader { tq, ioqueue });
        }

        Ok(Self {
            ctx,
            obj_id,
            base_loc,
            mode,
            pattern,
            consensus: resolved,
            codec,
            readers,
            writers: Vec::new(),
            rebuild_writers: (0..total).map(|_| None).collect(),
            damaged,
            read_cursor: Mutex::new(ReadCursor {
                held: (0..total).map(|_| None).collect(),
                logical_offset: 0,
                active_width,
                pending_skip: vec![0; total],
            }),
            write_cursor: Mutex::new(WriteCursor {
                stripe_buf: Vec::new(),
                totsz: 0,
            }),
        })
    }

    fn probe_meta(ctx: &Arc<Context<D>>, loc: Location, obj_id: &str) -> Option<MetaInfo> {
        let mut handle = ctx.dal().open(DalMode::MetaRead, loc, obj_id).ok()?;
        let len = ctx.dal().meta_len(&handle).ok()?;
        let mut buf = vec![0u8; len.max(ne_meta::MAX_ENCODED_LEN)];
        let n = ctx.dal().get_meta(&mut handle, &mut buf).ok()?;
        let _ = ctx.dal().close(handle);
        let (meta, _status) = MetaInfo::parse(&buf[..n.min(buf.len())]).ok()?;
        Some(meta)
    }

    // ---- create (write family) ------------------------------------------

    /// Opens a fresh write handle for `pattern`, no `STAT` pass — the
    /// pattern is supplied by the caller rather than discovered, since there
    /// is no prior meta to reach consensus over. All `N+E` writers start at once.
    #[tracing::instrument(skip(ctx, obj_id))]
    pub fn create(ctx: Arc<Context<D>>, mode: HandleMode, obj_id: impl Into<String>, base_loc: Location, pattern: ErasurePattern, versz: u64) -> Result<Self> {
        if !mode.is_write() {
            return Err(CoreError::HandleState(mode));
        }
        let obj_id = obj_id.into();
        let total = pattern.total_parts() as usize;
        let dal_mode = if mode == HandleMode::Rebuild { DalMode::Rebuild } else { DalMode::Write };
        let codec = ErasureCodec::with_lock(pattern.n as usize, pattern.e as usize, ctx.codec_lock());

        let mut writers = Vec::with_capacity(total);
        for i in 0..total {
            let loc = base_loc.with_block(pattern.block_for(i as u32));
            let ioqueue = Arc::new(IoQueue::create(versz as usize, pattern.partsz as usize, IoMode::Write)?);
            let state = WriteWorkerState::new(Arc::clone(ctx.dal()), loc, obj_id.clone(), dal_mode, ctx.erasurelock());
            let tq = ThreadQueue::start(1, 0, SUPER_BLOCK_CNT, WriteWorker::default(), state);
            writers.push(ShardWriter {
                tq,
                ioqueue,
                current: Mutex::new(None),
            });
        }

        let consensus = MetaInfo::new(
            i64::from(pattern.n),
            i64::from(pattern.e),
            i64::from(pattern.o),
            i64::from(pattern.partsz),
            versz as i64,
            0,
            0,
            0,
        );

        let total_count = total;
        Ok(Self {
            ctx,
            obj_id,
            base_loc,
            mode,
            pattern,
            consensus,
            codec,
            readers: Vec::new(),
            writers,
            rebuild_writers: (0..total_count).map(|_| None).collect(),
            damaged: (0..total_count).map(|_| AtomicBool::new(false)).collect(),
            read_cursor: Mutex::new(ReadCursor {
                held: Vec::new(),
                logical_offset: 0,
                active_width: 0,
                pending_skip: Vec::new(),
            }),
            write_cursor: Mutex::new(WriteCursor {
                stripe_buf: Vec::new(),
                totsz: 0,
            }),
        })
    }

    // ---- write path (§4.7.4) --------------------------------------------

    /// Buffers `data` into the per-shard stripe builder, encoding and pushing
    /// full stripes as they accumulate.
    pub fn put(&self, data: &[u8]) -> Result<()> {
        if !self.mode.is_write() {
            return Err(CoreError::HandleState(self.mode));
        }
        let stripe_data_size = self.pattern.stripe_data_size() as usize;
        let mut cursor = self.write_cursor.lock();
        let mut pos = 0;
        while pos < data.len() {
            let space = stripe_data_size - cursor.stripe_buf.len();
            let take = space.min(data.len() - pos);
            cursor.stripe_buf.extend_from_slice(&data[pos..pos + take]);
            pos += take;
            cursor.totsz += take as u64;
            if cursor.stripe_buf.len() == stripe_data_size {
                self.flush_stripe(&mut cursor)?;
            }
        }
        Ok(())
    }

    fn flush_stripe(&self, cursor: &mut WriteCursor) -> Result<()> {
        let n = self.pattern.n as usize;
        let e = self.pattern.e as usize;
        let partsz = self.pattern.partsz as usize;

        let data_slices: Vec<&[u8]> = (0..n).map(|i| &cursor.stripe_buf[i * partsz..(i + 1) * partsz]).collect();
        let mut parity_bufs: Vec<Vec<u8>> = (0..e).map(|_| vec![0u8; partsz]).collect();
        if e > 0 {
            let mut parity_refs: Vec<&mut [u8]> = parity_bufs.iter_mut().map(Vec::as_mut_slice).collect();
            self.codec.encode(&data_slices, &mut parity_refs)?;
        }

        for i in 0..n {
            self.push_to_shard(i, &cursor.stripe_buf[i * partsz..(i + 1) * partsz])?;
        }
        for j in 0..e {
            self.push_to_shard(n + j, &parity_bufs[j])?;
        }
        cursor.stripe_buf.clear();
        Ok(())
    }

    fn push_to_shard(&self, shard: usize, bytes: &[u8]) -> Result<()> {
        let writer = &self.writers[shard];
        let mut current = writer.current.lock().take().unwrap_or_else(|| writer.ioqueue.take_free());
        current.append(bytes);
        match writer.ioqueue.reserve(Some(current)) {
            Reservation::Rotated { full, fresh } => {
                writer.tq.enqueue(false, full);
                *writer.current.lock() = Some(fresh);
            }
            Reservation::Filling(block) => {
                *writer.current.lock() = Some(block);
            }
        }
        Ok(())
    }

    // ---- read path (§4.7.2) ---------------------------------------------

    /// Fills `out` with the next bytes of the object from the handle's
    /// current read position, returning the number of bytes actually placed
    /// (less than `out.len()` only at end of object).
    pub fn read_stripes(&self, out: &mut [u8]) -> Result<usize> {
        if !self.mode.is_read() {
            return Err(CoreError::HandleState(self.mode));
        }
        let partsz = self.pattern.partsz as usize;
        let n = self.pattern.n as usize;
        let stripe_data_size = n * partsz;
        let totsz = self.totsz();

        let mut cursor = self.read_cursor.lock();
        let mut written = 0usize;
        while written < out.len() && cursor.logical_offset < totsz {
            let stripe_index = cursor.logical_offset / stripe_data_size as u64;
            let intra = (cursor.logical_offset - stripe_index * stripe_data_size as u64) as usize;
            let parts = self.fetch_stripe_parts(&mut cursor)?;
            let mut data = Vec::with_capacity(stripe_data_size);
            for part in parts.iter().take(n) {
                data.extend_from_slice(part);
            }
            let avail = data.len() - intra;
            let remaining_object = (totsz - cursor.logical_offset) as usize;
            let want = avail.min(out.len() - written).min(remaining_object);
            out[written..written + want].copy_from_slice(&data[intra..intra + want]);
            written += want;
            cursor.logical_offset += want as u64;
        }
        Ok(written)
    }

    /// Dequeues (or continues draining) one `partsz` slice for `shard`,
    /// storing the result into `parts[shard]` (left `None` on any error) and
    /// updating `cursor.held`/`self.damaged` accordingly.
    fn fetch_one_shard(&self, shard: usize, parts: &mut [Option<Vec<u8>>], cursor: &mut ReadCursor) {
        let partsz = self.pattern.partsz as usize;
        let slot = match cursor.held[shard].take() {
            Some(pair) => Some(pair),
            None => match self.readers[shard].tq.dequeue(false) {
                Some(block) => {
                    let skip = std::mem::replace(&mut cursor.pending_skip[shard], 0);
                    Some((block, skip))
                }
                None => None,
            },
        };
        let Some((mut block, pos)) = slot else {
            self.damaged[shard].store(true, Ordering::SeqCst);
            return;
        };
        if pos + partsz > block.data_size() {
            self.damaged[shard].store(true, Ordering::SeqCst);
            self.readers[shard].ioqueue.release(block);
            return;
        }
        let bad = block.error_end() > pos;
        if bad {
            self.damaged[shard].store(true, Ordering::SeqCst);
        } else {
            parts[shard] = Some(block.data()[pos..pos + partsz].to_vec());
        }
        let new_pos = pos + partsz;
        if new_pos >= block.data_size() {
            self.readers[shard].ioqueue.release(block);
            cursor.held[shard] = None;
        } else {
            cursor.held[shard] = Some((block, new_pos));
        }
    }

    /// Dequeues (or continues draining) one `partsz` slice per active shard,
    /// reconstructing any erased slices via [`ErasureCodec::decode`].
    /// Returns all `N+E` parts (data first, then parity) so both plain reads
    /// and rebuild can share this primitive.
    fn fetch_stripe_parts(&self, cursor: &mut ReadCursor) -> Result<Vec<Vec<u8>>> {
        let total = self.total_parts();
        let mut parts: Vec<Option<Vec<u8>>> = vec![None; total];

        // Only the currently-active shards are fetched in this first round —
        // shards still paused are not errors yet, just not read, and must not
        // count against the `E` budget below.
        let old_active_width = cursor.active_width;
        for shard in 0..old_active_width {
            self.fetch_one_shard(shard, &mut parts, cursor);
        }

        let active_errors = parts.iter().take(old_active_width).filter(|p| p.is_none()).count();

        // The first error activates every paused reader immediately rather
        // than ramping up one at a time; see DESIGN.md for the rationale.
        if active_errors > 0 && old_active_width < total {
            let shard_offset = self.stripe_shard_offset(cursor.logical_offset);
            let (raw_offset, intra) = self.shard_seek_target(shard_offset);
            for shard in old_active_width..total {
                // A newly-activated reader has been halted since `open` and
                // so cannot have produced anything yet, but reposition and
                // drain defensively in case it raced the halt before pausing.
                let state = self.readers[shard].tq.state();
                state.reset_offset(raw_offset);
                while let Some(block) = self.readers[shard].tq.try_dequeue() {
                    self.readers[shard].ioqueue.release(block);
                }
                cursor.pending_skip[shard] = intra;
                self.readers[shard].tq.clear_halt();
            }
            cursor.active_width = total;
        }

        // Shards newly activated above haven't been fetched for this stripe yet.
        for shard in old_active_width..cursor.active_width {
            self.fetch_one_shard(shard, &mut parts, cursor);
        }

        let erased: Vec<usize> = parts.iter().enumerate().filter(|(_, p)| p.is_none()).map(|(i, _)| i).collect();
        let e = self.pattern.e as usize;
        if erased.len() > e {
            return Err(CoreError::UnrecoverableStripe {
                offset: cursor.logical_offset,
                errors: erased.len(),
                e,
            });
        }

        if erased.is_empty() {
            return Ok(parts.into_iter().map(|p| p.unwrap()).collect());
        }

        let partsz = self.pattern.partsz as usize;
        let survivor_indices: Vec<usize> = parts.iter().enumerate().filter_map(|(i, p)| p.as_ref().map(|_| i)).collect();
        let survivor_owned: Vec<&Vec<u8>> = survivor_indices.iter().map(|&i| parts[i].as_ref().unwrap()).collect();
        let survivor_data: Vec<&[u8]> = survivor_owned.iter().map(|v| v.as_slice()).collect();

        let mut outputs: Vec<Vec<u8>> = erased.iter().map(|_| vec![0u8; partsz]).collect();
        {
            let mut output_refs: Vec<&mut [u8]> = outputs.iter_mut().map(Vec::as_mut_slice).collect();
            self.codec.decode(&survivor_indices, &survivor_data, &erased, &mut output_refs)?;
        }
        for (idx, bytes) in erased.iter().zip(outputs.into_iter()) {
            parts[*idx] = Some(bytes);
        }

        Ok(parts.into_iter().map(|p| p.unwrap()).collect())
    }

    // ---- seek --------------------------------------------------------------

    /// Converts an object-level logical offset into the shard-logical offset
    /// of the start of the stripe that contains it (`stripe_index * partsz`).
    fn stripe_shard_offset(&self, object_offset: u64) -> u64 {
        let partsz = u64::from(self.pattern.partsz);
        let n = u64::from(self.pattern.n);
        let stripe_index = object_offset / (n * partsz);
        stripe_index * partsz
    }

    /// Converts a shard-logical (de-framed) byte offset into the raw on-disk
    /// offset of the versz-sized buffer that contains it, plus how many
    /// logical bytes into that buffer's body the target position sits at.
    ///
    /// Each on-disk buffer is one CRC-framed chunk: `versz - 4` bytes of body
    /// followed by a 4-byte trailer, so `versz` bytes of body-plus-trailer map
    /// to `versz - 4` bytes of logical shard data. Positioning the worker at
    /// `raw_offset` (a multiple of `versz`) keeps its reads aligned on frame
    /// boundaries; `intra` is then applied as a one-time skip into the first
    /// block assembled from that position (see `pending_skip`).
    fn shard_seek_target(&self, shard_offset: u64) -> (u64, usize) {
        let versz = self.consensus.versz.max(0) as u64;
        let chunk_size = versz.saturating_sub(4).max(1);
        let frame_idx = shard_offset / chunk_size;
        let raw_offset = frame_idx * versz;
        let intra = (shard_offset - frame_idx * chunk_size) as usize;
        (raw_offset, intra)
    }

    /// Redirects every active worker thread to `offset` via a halt/reset/
    /// re-populate dance. Reusing already-buffered data within the read-ahead
    /// range is not implemented: every seek pays the full halt-and-restart
    /// cost, a deliberate simplification.
    pub fn seek(&self, offset: u64) -> Result<()> {
        if !self.mode.is_read() {
            return Err(CoreError::HandleState(self.mode));
        }
        let mut cursor = self.read_cursor.lock();
        let total = self.total_parts();

        for shard in 0..total {
            self.readers[shard].tq.set_halt();
        }
        for shard in 0..total {
            self.readers[shard].tq.wait_for_pause();
        }
        for (shard, held) in cursor.held.iter_mut().enumerate() {
            if let Some((block, _)) = held.take() {
                self.readers[shard].ioqueue.release(block);
            }
        }
        // A reader may have produced (or be racing the halt to produce) one
        // or more ioblocks before pausing; drain the FIFO of anything already
        // queued so the post-seek consumer never sees pre-seek stripes.
        for shard in 0..total {
            while let Some(block) = self.readers[shard].tq.try_dequeue() {
                self.readers[shard].ioqueue.release(block);
            }
        }

        let shard_offset = self.stripe_shard_offset(offset);
        let (raw_offset, intra) = self.shard_seek_target(shard_offset);

        for shard in 0..total {
            cursor.pending_skip[shard] = intra;
            let state = self.readers[shard].tq.state();
            state.reset_offset(raw_offset);
            self.readers[shard].tq.clear_halt();
        }
        cursor.logical_offset = offset;
        Ok(())
    }

    // ---- rebuild (§4.7.5) ------------------------------------------------

    /// Sweeps the object end to end through the read-erasure pipeline,
    /// writing the reconstructed content of every shard to a parallel
    /// write-worker. A shard only turns out damaged (or not) as the sweep
    /// actually reads it — the damaged set from `open`'s `STAT` pass covers
    /// only meta disagreement, not data corruption — so a writer is started
    /// for every shard up front and only the ones that end up damaged are
    /// committed; the rest are aborted without ever being renamed into
    /// place. Returns the number of shards still damaged afterward.
    pub fn rebuild(&mut self) -> Result<usize> {
        if self.mode != HandleMode::Rebuild {
            return Err(CoreError::HandleState(self.mode));
        }
        let total = self.total_parts();
        let versz = self.consensus.versz.max(0) as u64;

        for shard in 0..total {
            let loc = self.loc_for(shard);
            let ioqueue = Arc::new(IoQueue::create(versz as usize, self.pattern.partsz as usize, IoMode::Write)?);
            let state = WriteWorkerState::new(Arc::clone(self.ctx.dal()), loc, self.obj_id.clone(), DalMode::Rebuild, self.ctx.erasurelock());
            let tq = ThreadQueue::start(1, 0, SUPER_BLOCK_CNT, WriteWorker::default(), state);
            self.rebuild_writers[shard] = Some(ShardWriter {
                tq,
                ioqueue,
                current: Mutex::new(None),
            });
        }

        let stripe_data_size = self.pattern.stripe_data_size();
        let totsz = self.totsz();
        {
            let mut cursor = self.read_cursor.lock();
            cursor.logical_offset = 0;
            for held in &mut cursor.held {
                *held = None;
            }
            while cursor.logical_offset < totsz {
                let parts = self.fetch_stripe_parts(&mut cursor)?;
                for shard in 0..total {
                    if let Some(writer) = &self.rebuild_writers[shard] {
                        let mut current = writer.current.lock().take().unwrap_or_else(|| writer.ioqueue.take_free());
                        current.append(&parts[shard]);
                        match writer.ioqueue.reserve(Some(current)) {
                            Reservation::Rotated { full, fresh } => {
                                writer.tq.enqueue(false, full);
                                *writer.current.lock() = Some(fresh);
                            }
                            Reservation::Filling(block) => {
                                *writer.current.lock() = Some(block);
                            }
                        }
                    }
                }
                cursor.logical_offset = (cursor.logical_offset / stripe_data_size + 1) * stripe_data_size;
            }
        }

        for shard in 0..total {
            if let Some(writer) = self.rebuild_writers[shard].take() {
                if let Some(block) = writer.current.lock().take() {
                    if block.data_size() > 0 {
                        writer.tq.enqueue(false, block);
                    }
                }
                writer.tq.set_finish();
                writer.tq.wait_for_completion();

                let mut failed = false;
                while let Some((_, status)) = writer.tq.next_thread_status() {
                    if status != ne_threadqueue::ThreadStatus::Terminated {
                        failed = true;
                    }
                }
                let state = writer.tq.state();
                let worker_failed = state.data_error.load(Ordering::SeqCst);
                let was_damaged = self.damaged[shard].load(Ordering::SeqCst);
                let handle = state.handle.lock().take();

                if was_damaged && !failed && !worker_failed {
                    if let Some(mut h) = handle {
                        let meta = MetaInfo::new(
                            self.consensus.n,
                            self.consensus.e,
                            self.consensus.o,
                            self.consensus.partsz,
                            self.consensus.versz,
                            state.bytes_written.load(Ordering::SeqCst) as i64,
                            state.crc_accumulator.lock().total() as i64,
                            self.consensus.totsz,
                        );
                        let _ = self.ctx.dal().set_meta(&mut h, meta.serialize().as_bytes());
                        let _ = self.ctx.dal().close(h);
                        self.damaged[shard].store(false, Ordering::SeqCst);
                    }
                } else if let Some(h) = handle {
                    let _ = self.ctx.dal().abort(h);
                }
                let _ = writer.tq.close();
            }
        }

        let remaining = (0..total).filter(|&i| self.damaged[i].load(Ordering::SeqCst)).count();
        Ok(remaining)
    }

    // ---- close (§4.7.6) --------------------------------------------------

    /// Drains, signals FINISH, joins every worker, and — for writers —
    /// enforces the `E - MIN_PROTECTION` integrity margin.
    pub fn close(mut self) -> Result<CloseReport> {
        if self.mode.is_write() {
            self.close_write()
        } else {
            self.close_read()
        }
    }

    fn close_write(&mut self) -> Result<CloseReport> {
        let stripe_data_size = self.pattern.stripe_data_size() as usize;
        let mut cursor = self.write_cursor.lock();
        if !cursor.stripe_buf.is_empty() {
            let pad = stripe_data_size - cursor.stripe_buf.len();
            cursor.stripe_buf.extend(std::iter::repeat(0u8).take(pad));
            self.flush_stripe(&mut cursor)?;
        }
        let final_totsz = cursor.totsz;
        drop(cursor);

        let total = self.total_parts();
        for shard in 0..total {
            let writer = &self.writers[shard];
            if let Some(block) = writer.current.lock().take() {
                if block.data_size() > 0 {
                    writer.tq.enqueue(false, block);
                }
            }
            writer.tq.set_finish();
        }
        for shard in 0..total {
            self.writers[shard].tq.wait_for_completion();
            while self.writers[shard].tq.next_thread_status().is_some() {}
        }

        let mut errors = 0usize;
        for shard in 0..total {
            if self.writers[shard].tq.state().data_error.load(Ordering::SeqCst) {
                errors += 1;
            }
        }

        let e = self.pattern.e as usize;
        let min_protection = self.ctx.config().min_protection as usize;
        let margin = e.saturating_sub(min_protection);

        if errors > margin {
            for shard in 0..total {
                let state = self.writers[shard].tq.state();
                if let Some(h) = state.handle.lock().take() {
                    let _ = self.ctx.dal().abort(h);
                }
                let loc = self.loc_for(shard);
                let _ = self.ctx.dal().del(loc, &self.obj_id);
            }
            return Err(CoreError::WriteIntegrity {
                failed: errors,
                e,
                min_protection: min_protection as u32,
            });
        }

        for shard in 0..total {
            let state = self.writers[shard].tq.state();
            let has_error = state.data_error.load(Ordering::SeqCst);
            let Some(mut h) = state.handle.lock().take() else {
                continue;
            };
            if has_error {
                let _ = self.ctx.dal().abort(h);
                continue;
            }
            let meta = MetaInfo::new(
                i64::from(self.pattern.n),
                i64::from(self.pattern.e),
                i64::from(self.pattern.o),
                i64::from(self.pattern.partsz),
                self.consensus.versz,
                state.bytes_written.load(Ordering::SeqCst) as i64,
                state.crc_accumulator.lock().total() as i64,
                final_totsz as i64,
            );
            if self.ctx.dal().set_meta(&mut h, meta.serialize().as_bytes()).is_err() || self.ctx.dal().close(h).is_err() {
                errors += 1;
            }
        }

        Ok(CloseReport { errors })
    }

    fn close_read(&mut self) -> Result<CloseReport> {
        let total = self.total_parts();
        for shard in 0..total {
            self.readers[shard].tq.clear_halt();
            self.readers[shard].tq.set_finish();
        }
        {
            let mut cursor = self.read_cursor.lock();
            for (shard, held) in cursor.held.iter_mut().enumerate() {
                if let Some((block, _)) = held.take() {
                    self.readers[shard].ioqueue.release(block);
                }
            }
        }
        for shard in 0..total {
            while self.readers[shard].tq.dequeue(true).is_some() {}
            self.readers[shard].tq.wait_for_completion();
            while self.readers[shard].tq.next_thread_status().is_some() {}
        }

        let mut errors = 0usize;
        for shard in 0..total {
            let state = self.readers[shard].tq.state();
            if state.data_error.load(Ordering::SeqCst) || state.meta_error.load(Ordering::SeqCst) || self.damaged[shard].load(Ordering::SeqCst) {
                errors += 1;
            }
            if let Some(h) = state.handle.lock().take() {
                let _ = self.ctx.dal().close(h);
            }
        }

        Ok(CloseReport { errors })
    }
}

/// Placeholder used only for a [`HandleMode::Stat`] handle, which never
/// performs any erasure computation; any process-wide lock is harmless since
/// `encode`/`decode` are never invoked on this codec.
fn ctx_lock_placeholder() -> ne_erasure::ErasureLock {
    ne_erasure::ErasureLock::process_wide()
}
