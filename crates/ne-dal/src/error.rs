//! `DalError`: the failure taxonomy every backend surfaces.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DalError>;

#[derive(Debug, Error)]
pub enum DalError {
    #[error("object not found")]
    NotFound,

    #[error("object already exists")]
    AlreadyExists,

    #[error("secure root containment violated: {0}")]
    SecureRootViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("errno {0}")]
    Errno(#[from] nix::errno::Errno),

    #[error("handle mode {mode:?} does not permit this operation")]
    InvalidHandleMode { mode: crate::DalMode },

    #[error("migrate refused: {0}")]
    InvalidMigration(String),

    #[error("migrate left possible duplicate data at the destination")]
    PossibleDuplicate,

    #[error("invalid dir_template: {0}")]
    InvalidTemplate(String),
}

impl DalError {
    /// `true` for every variant that represents a genuine failure the caller
    /// must treat as such, `false` for [`DalError::NotFound`] in the contexts
    /// (`del`, some `migrate` callers) where absence is itself a benign
    /// outcome and the caller downgrades it rather than propagating.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}
