use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThreadQueueError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThreadQueueError {
    #[error("thread queue closed with {0} thread status entries uncollected")]
    UncollectedStatus(usize),

    #[error("thread queue closed with elements still in the work queue")]
    NotDrained,

    #[error("at least one thread failed to initialize")]
    InitFailed,
}
