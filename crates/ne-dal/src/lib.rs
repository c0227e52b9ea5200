//! The Data Access Layer: a storage-backend capability trait plus its two
//! implementations.
//!
//! `ne-core` is generic over `D: Dal` and never depends on `posix` or `noop`
//! directly beyond picking a concrete backend at startup.

mod error;
pub mod noop;
pub mod posix;
mod traits;

pub use error::{DalError, Result};
pub use noop::{NoopDal, NoopHandle, NoopSourceCache};
pub use posix::{OpenFlags, PosixDal, PosixDalConfig, PosixHandle, VerifyBounds};
pub use traits::{Dal, DalMode, MigrateOutcome, VerifyFlags};
