//! `CoreError`: the top-level taxonomy a caller actually sees.
//!
//! Per-shard meta/data failures are deliberately *not* variants here: those are
//! accumulated as the `meta_error`/`data_error` flags on
//! [`crate::worker::ReadWorkerState`] and [`crate::worker::WriteWorkerState`],
//! and only escalate into one of these `Result` failures once they cross a
//! recoverability threshold.

use ne_dal::DalError;
use ne_meta::MetaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A single stripe has more than `E` shards in error. The handle remains
    /// usable for seeking elsewhere in the object.
    #[error("stripe at offset {offset} has {errors} shard errors, more than E={e}")]
    UnrecoverableStripe { offset: u64, errors: usize, e: usize },

    /// A closing writer has more than `E - MIN_PROTECTION` workers with errors.
    /// The partial object was deleted.
    #[error("write integrity violated: {failed} of {e} parity workers failed, margin was {min_protection}")]
    WriteIntegrity { failed: usize, e: usize, min_protection: u32 },

    /// An API call invalid for the handle's current mode, e.g. `put` on a
    /// read handle.
    #[error("operation not valid for handle in state {0:?}")]
    HandleState(ne_common::HandleMode),

    /// Surfaces only at `open`/`Context` construction; never observed after open.
    #[error("configuration error: {0}")]
    Config(String),

    /// `open`'s `STAT` pass could not establish consensus meta: there must be
    /// at least one valid meta reading and at least `N` matching votes on `N`.
    #[error("insufficient meta consensus: {0}")]
    InsufficientConsensus(String),

    #[error(transparent)]
    Dal(#[from] DalError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Erasure(#[from] ne_erasure::ErasureError),

    #[error(transparent)]
    Pattern(#[from] ne_common::Error),

    #[error(transparent)]
    IoQueue(#[from] ne_ioqueue::IoQueueError),
}
