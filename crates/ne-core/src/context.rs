//! [`Context`]: per-backend state shared across every [`crate::Handle`]
//! opened against it.

use crate::config::ConsensusConfig;
use ne_common::config::{ContextConfig, SharedErasureLock};
use ne_dal::Dal;
use ne_erasure::ErasureLock;
use std::sync::Arc;

/// Ties one DAL backend to the configuration and erasurelock every handle
/// opened against it will share.
pub struct Context<D: Dal> {
    dal: Arc<D>,
    config: ContextConfig,
    consensus: ConsensusConfig,
    lock: SharedErasureLock,
}

impl<D: Dal> Context<D> {
    /// Builds a context around its own fresh erasurelock. Handles opened
    /// against two different `Context`s built this way do not serialize with
    /// each other — share a `SharedErasureLock` explicitly via
    /// [`Self::with_lock`] if that matters for the deployment.
    #[must_use]
    pub fn new(dal: D, config: ContextConfig, consensus: ConsensusConfig) -> Self {
        Self::with_lock(dal, config, consensus, Arc::new(parking_lot::Mutex::new(())))
    }

    #[must_use]
    pub fn with_lock(dal: D, config: ContextConfig, consensus: ConsensusConfig, lock: SharedErasureLock) -> Self {
        Self {
            dal: Arc::new(dal),
            config,
            consensus,
            lock,
        }
    }

    #[must_use]
    pub fn dal(&self) -> &Arc<D> {
        &self.dal
    }

    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    #[must_use]
    pub fn consensus(&self) -> ConsensusConfig {
        self.consensus
    }

    #[must_use]
    pub fn erasurelock(&self) -> SharedErasureLock {
        Arc::clone(&self.lock)
    }

    /// An [`ErasureLock`] wrapping this context's shared lock, for an
    /// [`ne_erasure::ErasureCodec`] built against this context.
    #[must_use]
    pub fn codec_lock(&self) -> ErasureLock {
        ErasureLock::shared(Arc::clone(&self.lock))
    }
}
