//! Error taxonomy for the erasure engine.

use thiserror::Error;

/// `ne-erasure` result type.
pub type Result<T> = std::result::Result<T, ErasureError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ErasureError {
    #[error("matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("not enough surviving parts: have {available}, need {required}")]
    InsufficientParts { available: usize, required: usize },

    #[error("more than {max} parts are in error; unrecoverable")]
    TooManyErrors { max: usize },

    #[error("buffer length mismatch: {context}")]
    DimensionMismatch { context: String },
}
