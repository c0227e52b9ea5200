use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoQueueError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IoQueueError {
    #[error("invalid ioqueue sizing: {0}")]
    InvalidSizing(String),
}
