//! Shared types and error taxonomy for the erasure storage engine.
//!
//! Every other crate in this workspace (`ne-meta`, `ne-erasure`, `ne-ioqueue`,
//! `ne-threadqueue`, `ne-dal`, `ne-core`) depends on this one for the location
//! model, the erasure pattern, handle modes, the checksum primitive, and the
//! common error/config scaffolding.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::{Crc32Accumulator, crc32_ieee};
pub use error::{Error, Result};
pub use types::{ErasurePattern, HandleMode, Location};

/// Compile-time cap on `N + E` for any erasure pattern.
///
/// 32 is the widest stripe any backend in this workspace is tested against, so
/// it is kept as-is rather than raised speculatively.
pub const MAXPARTS: usize = 32;
