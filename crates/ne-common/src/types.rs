//! The physical location model and erasure pattern.

use crate::error::{Error, Result};
use crate::MAXPARTS;
use serde::{Deserialize, Serialize};

/// A 4-dimensional physical location: `(pod, block, cap, scatter)`.
///
/// Every shard of every object lives at exactly one `Location`; within a stripe,
/// shard `i` (0-indexed) lives at `block = (i + O) mod (N+E)`, with pod/cap/scatter
/// inherited unchanged from the object (see [`ErasurePattern::block_for`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub pod: u32,
    pub block: u32,
    pub cap: u32,
    pub scatter: u32,
}

impl Location {
    #[must_use]
    pub fn new(pod: u32, block: u32, cap: u32, scatter: u32) -> Self {
        Self {
            pod,
            block,
            cap,
            scatter,
        }
    }

    /// Returns the location of shard `block` within the same pod/cap/scatter.
    #[must_use]
    pub fn with_block(self, block: u32) -> Self {
        Self { block, ..self }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.pod, self.block, self.cap, self.scatter)
    }
}

/// `(N, E, O, partsz)`: the shape of a stripe.
///
/// `N` data shards, `E` parity shards, `O` the per-object offset into the block
/// ring, `partsz` the unit of erasure computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasurePattern {
    pub n: u32,
    pub e: u32,
    pub o: u32,
    pub partsz: u32,
}

impl ErasurePattern {
    /// Validates and constructs a pattern: `N ≥ 1`, `E ≥ 0`, `N+E ≤ MAXPARTS`,
    /// `0 ≤ O < N+E`, `partsz ≥ 1`.
    pub fn new(n: u32, e: u32, o: u32, partsz: u32) -> Result<Self> {
        if n < 1 {
            return Err(Error::invalid_pattern("N must be at least 1"));
        }
        let total = n as usize + e as usize;
        if total > MAXPARTS {
            return Err(Error::invalid_pattern(format!(
                "N+E ({total}) exceeds MAXPARTS ({MAXPARTS})"
            )));
        }
        if o as usize >= total {
            return Err(Error::invalid_pattern(format!(
                "O ({o}) must be less than N+E ({total})"
            )));
        }
        if partsz < 1 {
            return Err(Error::invalid_pattern("partsz must be at least 1"));
        }
        Ok(Self { n, e, o, partsz })
    }

    #[must_use]
    pub fn total_parts(self) -> u32 {
        self.n + self.e
    }

    /// The size in bytes of one stripe's data-only portion, `N · partsz`.
    #[must_use]
    pub fn stripe_data_size(self) -> u64 {
        u64::from(self.n) * u64::from(self.partsz)
    }

    /// Maps logical shard position `i` (0-indexed, `0..N+E`) to a physical block
    /// offset within the block ring: `block = (i + O) mod (N+E)`.
    #[must_use]
    pub fn block_for(self, i: u32) -> u32 {
        (i + self.o) % self.total_parts()
    }

    /// Inverse of [`Self::block_for`]: which logical position a physical block holds.
    #[must_use]
    pub fn position_for(self, block: u32) -> u32 {
        let total = self.total_parts();
        (block + total - self.o % total) % total
    }
}

/// The mode a [`Handle`](https://docs.rs/ne-core) is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleMode {
    /// Pattern discovery only; no worker threads.
    Stat,
    /// N workers; grows to N+E on error.
    RdOnly,
    /// N+E workers eagerly.
    RdAll,
    /// N+E writers.
    WrOnly,
    /// Alias of `WrOnly` in the current design.
    WrAll,
    /// Read + selective writeback of damaged shards.
    Rebuild,
}

impl HandleMode {
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::WrOnly | Self::WrAll)
    }

    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::RdOnly | Self::RdAll | Self::Rebuild)
    }

    /// Number of shards whose reader starts eagerly at open, for read-family modes.
    #[must_use]
    pub fn initial_read_width(self, n: u32, e: u32) -> u32 {
        match self {
            Self::RdOnly => n,
            Self::RdAll | Self::Rebuild => n + e,
            Self::WrOnly | Self::WrAll | Self::Stat => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_validates_constraints() {
        assert!(ErasurePattern::new(0, 1, 0, 4096).is_err());
        assert!(ErasurePattern::new(3, 1, 4, 4096).is_err());
        assert!(ErasurePattern::new(3, 1, 0, 0).is_err());
        assert!(ErasurePattern::new(3, 1, 0, 4096).is_ok());
    }

    #[test]
    fn pattern_rejects_oversized_stripe() {
        assert!(ErasurePattern::new(30, 10, 0, 1).is_err());
    }

    #[test]
    fn block_for_wraps_with_offset() {
        let pat = ErasurePattern::new(3, 1, 2, 4096).unwrap();
        // total = 4, O = 2: shard 0 -> block 2, shard 1 -> block 3, shard 2 -> block 0, shard 3 -> block 1
        assert_eq!(pat.block_for(0), 2);
        assert_eq!(pat.block_for(1), 3);
        assert_eq!(pat.block_for(2), 0);
        assert_eq!(pat.block_for(3), 1);
    }

    #[test]
    fn position_for_inverts_block_for() {
        let pat = ErasurePattern::new(4, 2, 3, 512).unwrap();
        for i in 0..pat.total_parts() {
            let block = pat.block_for(i);
            assert_eq!(pat.position_for(block), i);
        }
    }
}
