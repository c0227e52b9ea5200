//! The no-op DAL: discards everything written, and for reads synthesizes
//! zero-filled data of a configured size rather than touching real storage.
//! Useful for driving `ne-core`'s stripe and rebuild logic under a profiler
//! without a real filesystem in the loop.
//!
//! This backend does not attempt to replicate the exact CRC/tail-buffer
//! synthesis of cached read data byte-for-byte; it zero-fills reads up to the
//! configured `totsz`, which is sufficient for the workloads this backend
//! exists to serve (I/O-path exercising, not checksum fixtures).

use crate::error::{DalError, Result};
use crate::traits::{Dal, DalMode, MigrateOutcome, VerifyFlags};
use ne_common::Location;
use parking_lot::Mutex;

/// Static parameters a [`NoopDal`] pretends every object has: `N`, `E`,
/// `partsz`, `totsz`. `None` means "behave as if no object exists yet" for reads.
#[derive(Debug, Clone)]
pub struct NoopSourceCache {
    pub n: u32,
    pub e: u32,
    pub partsz: u64,
    pub totsz: u64,
}

/// A backend that performs no real I/O. `put`/`set_meta` are accepted and
/// discarded; `get`/`get_meta` return synthetic data derived from a single
/// process-wide [`NoopSourceCache`], if one was configured.
pub struct NoopDal {
    cache: Option<NoopSourceCache>,
    meta_text: Mutex<Option<Vec<u8>>>,
}

/// The no-op backend's block handle: just the mode it was opened with.
pub struct NoopHandle {
    mode: DalMode,
}

impl NoopDal {
    #[must_use]
    pub fn new(cache: Option<NoopSourceCache>) -> Self {
        Self {
            cache,
            meta_text: Mutex::new(None),
        }
    }
}

impl Dal for NoopDal {
    type Handle = NoopHandle;

    fn verify(&self, _flags: VerifyFlags) -> Result<u64> {
        Ok(0)
    }

    fn migrate(&self, _obj_id: &str, _src: Location, _dst: Location, _offline: bool) -> Result<MigrateOutcome> {
        Ok(MigrateOutcome::Complete)
    }

    fn del(&self, _loc: Location, _obj_id: &str) -> Result<()> {
        Ok(())
    }

    fn stat(&self, _loc: Location, _obj_id: &str) -> Result<()> {
        Ok(())
    }

    fn open(&self, mode: DalMode, _loc: Location, _obj_id: &str) -> Result<Self::Handle> {
        Ok(NoopHandle { mode })
    }

    fn get_meta(&self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize> {
        if !matches!(handle.mode, DalMode::Read | DalMode::MetaRead) {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        let guard = self.meta_text.lock();
        let bytes = guard.as_deref().unwrap_or(&[]);
        let n = buf.len().min(bytes.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(bytes.len())
    }

    fn meta_len(&self, _handle: &Self::Handle) -> Result<usize> {
        Ok(self.meta_text.lock().as_ref().map_or(0, Vec::len))
    }

    fn set_meta(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<()> {
        if !handle.mode.is_write() {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        *self.meta_text.lock() = Some(buf.to_vec());
        Ok(())
    }

    fn put(&self, handle: &mut Self::Handle, _buf: &[u8]) -> Result<()> {
        if !handle.mode.is_write() {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        Ok(())
    }

    fn get(&self, handle: &mut Self::Handle, buf: &mut [u8], offset: u64) -> Result<usize> {
        if !matches!(handle.mode, DalMode::Read | DalMode::MetaRead) {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        if offset >= cache.totsz {
            return Ok(0);
        }
        let n = buf.len().min((cache.totsz - offset) as usize);
        buf[..n].fill(0);
        Ok(n)
    }

    fn abort(&self, _handle: Self::Handle) -> Result<()> {
        Ok(())
    }

    fn close(&self, _handle: Self::Handle) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_mode_rejects_put() {
        let dal = NoopDal::new(None);
        let mut h = dal.open(DalMode::Read, Location::new(0, 0, 0, 0), "x").unwrap();
        assert!(dal.put(&mut h, b"no").is_err());
    }

    #[test]
    fn get_without_cache_returns_zero_bytes() {
        let dal = NoopDal::new(None);
        let mut h = dal.open(DalMode::Read, Location::new(0, 0, 0, 0), "x").unwrap();
        let mut buf = [0xffu8; 8];
        let n = dal.get(&mut h, &mut buf, 0).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn get_with_cache_zero_fills_up_to_totsz() {
        let dal = NoopDal::new(Some(NoopSourceCache {
            n: 3,
            e: 1,
            partsz: 1024,
            totsz: 10,
        }));
        let mut h = dal.open(DalMode::Read, Location::new(0, 0, 0, 0), "x").unwrap();
        let mut buf = [0xffu8; 16];
        let n = dal.get(&mut h, &mut buf, 4).unwrap();
        assert_eq!(n, 6);
        assert!(buf[..6].iter().all(|&b| b == 0));
    }

    #[test]
    fn set_then_get_meta_round_trips() {
        let dal = NoopDal::new(None);
        let mut w = dal.open(DalMode::Write, Location::new(0, 0, 0, 0), "x").unwrap();
        dal.set_meta(&mut w, b"v1 3 1 0 4096 1048576 1048576 123 11\n").unwrap();
        let mut r = dal.open(DalMode::Read, Location::new(0, 0, 0, 0), "x").unwrap();
        let mut buf = vec![0u8; 64];
        let n = dal.get_meta(&mut r, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"v1 3 1 0 4096 1048576 1048576 123 11\n");
    }
}
