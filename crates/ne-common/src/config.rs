//! Process configuration knobs recognized by the engine.
//!
//! These are plain data, populated however the embedding application likes (env,
//! file, or hand-built `Default`s in tests); no XML/env loader lives in this crate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-context configuration, shared across every handle opened against the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Upper bound on `N+E` for any object opened against this context.
    pub max_block: u32,
    /// Minimum intact parity count required after a write for it to be considered
    /// successful; defaults to 1.
    pub min_protection: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_block: crate::MAXPARTS as u32,
            min_protection: 1,
        }
    }
}

/// The process-wide erasure-table serialization lock. It is not serialized
/// here — `Arc<parking_lot::Mutex<()>>` is plain sharable data, and this type
/// exists only so a context's configuration can carry an externally-owned lock
/// when the caller wants several contexts to serialize with each other.
pub type SharedErasureLock = Arc<parking_lot::Mutex<()>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_min_protection_is_one() {
        assert_eq!(ContextConfig::default().min_protection, 1);
    }
}
