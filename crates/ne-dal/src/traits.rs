//! The DAL capability set — the only contract `ne-core` relies on. Modeled as
//! a trait rather than a vtable-of-function-pointers: each backend (POSIX,
//! NoOp, wrappers) is a proper value type implementing this trait, so
//! `ne-core` is generic over `D: Dal` instead of carrying an opaque context
//! pointer.

use crate::error::Result;
use ne_common::Location;

/// The open-mode a [`Dal::open`] call requests.
///
/// Distinct from [`ne_common::HandleMode`]: this is the DAL's narrower,
/// per-block mode, not the NE handle's object-wide mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DalMode {
    /// Retrieve data and/or meta info of an object.
    Read,
    /// Store data and/or meta info; append-only, working-path until close.
    Write,
    /// As `Write`, but at a distinct working path (`.rebuild` rather than
    /// `.partial`), so a concurrent reader of the live object is unaffected.
    Rebuild,
    /// Retrieve meta info only.
    MetaRead,
}

impl DalMode {
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::Rebuild)
    }
}

/// Flags accepted by [`Dal::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyFlags {
    /// Attempt to repair any problem found during verification.
    pub fix: bool,
    /// Check that the owner of the secure root (and its ancestry) matches the
    /// current process user/group.
    pub ownercheck: bool,
}

impl VerifyFlags {
    #[must_use]
    pub fn fix() -> Self {
        Self {
            fix: true,
            ownercheck: false,
        }
    }

    #[must_use]
    pub fn ownercheck() -> Self {
        Self {
            fix: false,
            ownercheck: true,
        }
    }
}

/// The outcome of a successful [`Dal::migrate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// Destination populated and source fully invalidated (or never needed
    /// invalidation because `offline` was false and a relocatable reference,
    /// e.g. a symlink, was left behind).
    Complete,
    /// Destination populated, but the source was not invalidated. Only
    /// possible when `offline` was requested; the caller should retry
    /// invalidating the source.
    DestPopulatedSourceRetained,
}

/// Every storage backend's capability set. `Handle` is the backend's own
/// open-block token; `ne-core` never inspects it, only threads it back
/// through subsequent calls.
pub trait Dal: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Ensures the backend is soundly configured; `0` issues found iff sound.
    /// `flags.fix` attempts repair as it walks.
    fn verify(&self, flags: VerifyFlags) -> Result<u64>;

    /// Relocates the object at `src` to `dst`. Refuses (`InvalidMigration`) if
    /// only `src.block != dst.block` (this would silently duplicate shard
    /// content across parity roles within the same stripe offset).
    fn migrate(&self, obj_id: &str, src: Location, dst: Location, offline: bool) -> Result<MigrateOutcome>;

    /// Removes both the data and meta shard at `loc`; absence of either is
    /// success.
    fn del(&self, loc: Location, obj_id: &str) -> Result<()>;

    /// `Ok(())` iff the data shard exists at `loc`.
    fn stat(&self, loc: Location, obj_id: &str) -> Result<()>;

    /// Opens a handle for subsequent block operations.
    fn open(&self, mode: DalMode, loc: Location, obj_id: &str) -> Result<Self::Handle>;

    /// Reads the meta-info buffer into `buf`, returning the byte count
    /// actually copied (which may be less than the full meta length if `buf`
    /// is undersized — callers retry with a larger buffer using
    /// [`Dal::meta_len`] as an upper bound).
    fn get_meta(&self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize>;

    /// The full length of the meta-info buffer for an already-open handle,
    /// regardless of the size of any buffer passed to `get_meta`.
    fn meta_len(&self, handle: &Self::Handle) -> Result<usize>;

    /// Writes the meta-info buffer. Valid only for `Write`/`Rebuild` handles.
    fn set_meta(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<()>;

    /// Appends `buf` to the handle's data stream. Valid only for
    /// `Write`/`Rebuild` handles; append-only.
    fn put(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<()>;

    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read. Valid only for `Read` handles.
    fn get(&self, handle: &mut Self::Handle, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Discards a `Write`/`Rebuild` handle's working data without making it
    /// visible at the final path.
    fn abort(&self, handle: Self::Handle) -> Result<()>;

    /// Finalizes a handle: for writers, the data becomes visible at its final
    /// path; for readers, simply releases resources.
    fn close(&self, handle: Self::Handle) -> Result<()>;

    /// Tears down backend-wide resources. Idempotent.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
