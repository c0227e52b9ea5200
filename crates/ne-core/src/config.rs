//! `ne-core`'s own configuration knobs.

use serde::{Deserialize, Serialize};

/// Bounds the `STAT` pass's meta-consensus sample independently of `N+E`,
/// as an explicit overridable field rather than a hardcoded constant.
///
/// See `DESIGN.md` for the reasoning behind the chosen default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Upper bound on how many shards' meta-info the `STAT` pass samples
    /// before declaring consensus, regardless of `N+E`.
    pub max_meta_consensus_sample: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_meta_consensus_sample: ne_common::MAXPARTS,
        }
    }
}
