//! The NE handle core: per-shard I/O worker threads plus the stripe
//! assembly/disassembly, Reed-Solomon reconstruction, seek, write, and rebuild
//! state machine that ties every other crate in this workspace together.
//!
//! `ne-core` is generic over `D: ne_dal::Dal`; it never depends on a concrete
//! backend, only on the capability set `ne-dal` defines.

mod config;
mod consensus;
mod context;
mod error;
mod handle;
mod wire;
mod worker;

pub use config::ConsensusConfig;
pub use context::Context;
pub use error::{CoreError, Result};
pub use handle::{CloseReport, Handle};
pub use worker::{ReadWorkerState, WriteWorkerState};
