use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetaError>;

/// Errors from the meta-info codec, reserved for catastrophic cases only — a
/// buffer that merely fails to fully parse returns `Ok` with a
/// [`crate::ParseStatus::Partial`] count instead of an error.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("meta info buffer is unreadable or carries no parseable fields")]
    Malformed,
}
