//! The POSIX DAL: a file-per-shard backend with sidecar meta files,
//! working-suffix + atomic rename finalization, and secure-root containment.

pub mod config;
mod path;
mod secure_root;

pub use config::{OpenFlags, PosixDalConfig, VerifyBounds};
pub use secure_root::SecureRoot;

use crate::error::{DalError, Result};
use crate::traits::{Dal, DalMode, MigrateOutcome, VerifyFlags};
use ne_common::Location;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

const FILE_MODE: Mode = Mode::from_bits_truncate(0o600);

/// File-per-shard implementation of [`Dal`]. All paths are resolved through
/// [`SecureRoot`]; nothing in this type ever touches an absolute path string
/// after construction.
pub struct PosixDal {
    root: SecureRoot,
    config: PosixDalConfig,
}

impl PosixDal {
    pub fn open(config: PosixDalConfig) -> Result<Self> {
        let root = SecureRoot::open(&config.secure_root)?;
        Ok(Self { root, config })
    }

    #[must_use]
    pub fn io_size(&self) -> usize {
        self.config.io_size
    }

    fn open_exclusive(&self, rel: &Path, oflags: OFlag) -> Result<File> {
        let flags = OFlag::O_CREAT | OFlag::O_EXCL | oflags;
        match self.root.open_at(rel, flags, FILE_MODE) {
            Ok(f) => Ok(f),
            Err(DalError::Errno(nix::errno::Errno::EEXIST)) => {
                self.root.unlink_at(rel)?;
                self.root.open_at(rel, flags, FILE_MODE)
            }
            Err(e) => Err(e),
        }
    }

    fn relative_symlink_target(from_dir: &Path, to: &Path) -> PathBuf {
        let depth = from_dir.components().count();
        let mut out = PathBuf::new();
        for _ in 0..depth {
            out.push("..");
        }
        out.push(to);
        out
    }
}

/// An open POSIX DAL block handle (`BLOCK_CTXT` in the original design).
pub struct PosixHandle {
    mode: DalMode,
    data_file: Option<File>,
    meta_file: Option<File>,
    /// Loaded eagerly for `Read`/`MetaRead` handles, since meta files are small.
    meta_bytes: Option<Vec<u8>>,
    data_working: PathBuf,
    meta_working: PathBuf,
    data_final: PathBuf,
    meta_final: PathBuf,
}

impl Dal for PosixDal {
    type Handle = PosixHandle;

    #[tracing::instrument(skip(self))]
    fn verify(&self, flags: VerifyFlags) -> Result<u64> {
        let mut problems = 0u64;
        if flags.ownercheck {
            problems += self.root.verify_ancestry(flags.fix)?;
        }

        let Some(bounds) = self.config.verify_bounds else {
            tracing::debug!("no verify_bounds configured; skipping leaf-directory walk");
            return Ok(problems);
        };

        for pod in 0..bounds.pods {
            for block in 0..bounds.blocks {
                for cap in 0..bounds.caps {
                    for scatter in 0..bounds.scatters {
                        let loc = Location::new(pod, block, cap, scatter);
                        let dir = path::expand_dir_template(&self.config.dir_template, loc)?;
                        if !self.root.exists_at(&dir) {
                            problems += 1;
                            if flags.fix {
                                self.root.ensure_dirs_at(&dir.join("_"), secure_root::SECURE_DIR_MODE)?;
                                let leaf_mode = Mode::from_bits_truncate(secure_root::SECURE_DIR_MODE.bits() | secure_root::LEAF_EXTRA_MODE.bits());
                                self.root.mkdir_at(&dir, leaf_mode)?;
                            }
                            continue;
                        }
                        let leaf_mode = Mode::from_bits_truncate(secure_root::SECURE_DIR_MODE.bits() | secure_root::LEAF_EXTRA_MODE.bits());
                        if self.root.check_dir_mode(&dir, leaf_mode, flags.fix)? {
                            problems += 1;
                        }
                    }
                }
            }
        }
        Ok(problems)
    }

    #[tracing::instrument(skip(self, obj_id))]
    fn migrate(&self, obj_id: &str, src: Location, dst: Location, offline: bool) -> Result<MigrateOutcome> {
        if src.pod == dst.pod && src.cap == dst.cap && src.scatter == dst.scatter && src.block != dst.block {
            return Err(DalError::InvalidMigration(
                "migrate refuses to alter only the block component of a location".to_string(),
            ));
        }

        let (src_data, src_meta) = path::final_block_paths(&self.config.dir_template, src, obj_id)?;
        let (dst_data, dst_meta) = path::final_block_paths(&self.config.dir_template, dst, obj_id)?;
        self.root.ensure_dirs_at(&dst_data, secure_root::SECURE_DIR_MODE)?;

        if offline {
            let linked = self.root.link_at(&src_data, &dst_data).is_ok() && self.root.link_at(&src_meta, &dst_meta).is_ok();
            if !linked {
                self.copy_block(&src_data, &dst_data)?;
                self.copy_block(&src_meta, &dst_meta)?;
            }
            match (self.root.unlink_at(&src_data), self.root.unlink_at(&src_meta)) {
                (Ok(()), Ok(())) => Ok(MigrateOutcome::Complete),
                _ => Ok(MigrateOutcome::DestPopulatedSourceRetained),
            }
        } else {
            let dst_dir = dst_data.parent().unwrap_or_else(|| Path::new(""));
            let data_target = PosixDal::relative_symlink_target(dst_dir, &src_data);
            let meta_target = PosixDal::relative_symlink_target(dst_dir, &src_meta);
            self.root.symlink_at(&data_target, &dst_data)?;
            self.root.symlink_at(&meta_target, &dst_meta)?;
            Ok(MigrateOutcome::Complete)
        }
    }

    #[tracing::instrument(skip(self, obj_id))]
    fn del(&self, loc: Location, obj_id: &str) -> Result<()> {
        let (data, meta) = path::final_block_paths(&self.config.dir_template, loc, obj_id)?;
        self.root.unlink_at(&data)?;
        self.root.unlink_at(&meta)?;
        // Working variants may also be lingering from a crashed writer.
        for mode in [DalMode::Write, DalMode::Rebuild] {
            let (wdata, wmeta) = path::block_paths(&self.config.dir_template, loc, obj_id, mode)?;
            self.root.unlink_at(&wdata)?;
            self.root.unlink_at(&wmeta)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, obj_id))]
    fn stat(&self, loc: Location, obj_id: &str) -> Result<()> {
        let (data, _meta) = path::final_block_paths(&self.config.dir_template, loc, obj_id)?;
        if self.root.exists_at(&data) {
            Ok(())
        } else {
            Err(DalError::NotFound)
        }
    }

    #[tracing::instrument(skip(self, obj_id))]
    fn open(&self, mode: DalMode, loc: Location, obj_id: &str) -> Result<Self::Handle> {
        match mode {
            DalMode::Read | DalMode::MetaRead => {
                let (data_final, meta_final) = path::final_block_paths(&self.config.dir_template, loc, obj_id)?;
                let data_file = if mode == DalMode::Read {
                    Some(self.root.open_at(&data_final, self.config.dataflags.to_oflag() | OFlag::O_RDONLY, Mode::empty())?)
                } else {
                    None
                };
                let mut meta_file = self.root.open_at(&meta_final, self.config.metaflags.to_oflag() | OFlag::O_RDONLY, Mode::empty()).ok();
                let meta_bytes = meta_file.as_mut().and_then(|f| {
                    let mut buf = Vec::new();
                    f.read_to_end(&mut buf).ok()?;
                    Some(buf)
                });
                Ok(PosixHandle {
                    mode,
                    data_file,
                    meta_file,
                    meta_bytes,
                    data_working: data_final.clone(),
                    meta_working: meta_final.clone(),
                    data_final,
                    meta_final,
                })
            }
            DalMode::Write | DalMode::Rebuild => {
                let (data_working, meta_working) = path::block_paths(&self.config.dir_template, loc, obj_id, mode)?;
                let (data_final, meta_final) = path::final_block_paths(&self.config.dir_template, loc, obj_id)?;
                self.root.ensure_dirs_at(&data_working, secure_root::SECURE_DIR_MODE)?;
                let data_file = self.open_exclusive(&data_working, self.config.dataflags.to_oflag() | OFlag::O_WRONLY)?;
                let meta_file = self.open_exclusive(&meta_working, self.config.metaflags.to_oflag() | OFlag::O_WRONLY)?;
                Ok(PosixHandle {
                    mode,
                    data_file: Some(data_file),
                    meta_file: Some(meta_file),
                    meta_bytes: None,
                    data_working,
                    meta_working,
                    data_final,
                    meta_final,
                })
            }
        }
    }

    /// Copies as much of the meta buffer as fits in `buf`; the return value
    /// is always the full meta length — callers compare it against
    /// `buf.len()` to detect truncation and retry with a bigger buffer.
    fn get_meta(&self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize> {
        let bytes = handle.meta_bytes.as_ref().ok_or(DalError::NotFound)?;
        let n = buf.len().min(bytes.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(bytes.len())
    }

    fn meta_len(&self, handle: &Self::Handle) -> Result<usize> {
        handle.meta_bytes.as_ref().map(Vec::len).ok_or(DalError::NotFound)
    }

    fn set_meta(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<()> {
        if !handle.mode.is_write() {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        let file = handle.meta_file.as_mut().ok_or(DalError::NotFound)?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    fn put(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<()> {
        if !handle.mode.is_write() {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        let file = handle.data_file.as_mut().ok_or(DalError::NotFound)?;
        file.write_all(buf)?;
        Ok(())
    }

    fn get(&self, handle: &mut Self::Handle, buf: &mut [u8], offset: u64) -> Result<usize> {
        if handle.mode != DalMode::Read {
            return Err(DalError::InvalidHandleMode { mode: handle.mode });
        }
        let file = handle.data_file.as_ref().ok_or(DalError::NotFound)?;
        Ok(file.read_at(buf, offset)?)
    }

    fn abort(&self, handle: Self::Handle) -> Result<()> {
        drop(handle.data_file);
        drop(handle.meta_file);
        if handle.mode.is_write() {
            self.root.unlink_at(&handle.data_working)?;
            self.root.unlink_at(&handle.meta_working)?;
        }
        Ok(())
    }

    fn close(&self, handle: Self::Handle) -> Result<()> {
        drop(handle.data_file);
        drop(handle.meta_file);
        if handle.mode.is_write() {
            self.root.rename_at(&handle.data_working, &handle.data_final)?;
            self.root.rename_at(&handle.meta_working, &handle.meta_final)?;
        }
        Ok(())
    }
}

impl PosixDal {
    fn copy_block(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut src_file = self.root.open_at(src, OFlag::O_RDONLY, Mode::empty())?;
        let mut dst_file = self.root.open_at(dst, OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, FILE_MODE)?;
        std::io::copy(&mut src_file, &mut dst_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dal(tmp: &tempfile::TempDir) -> PosixDal {
        let config = PosixDalConfig::new(tmp.path(), "{p}/{b}/{c}/{s}", 1 << 20);
        PosixDal::open(config).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let loc = Location::new(0, 0, 0, 0);

        let mut h = d.open(DalMode::Write, loc, "obj1").unwrap();
        d.put(&mut h, b"hello world").unwrap();
        d.set_meta(&mut h, b"v1 3 1 0 4096 1048576 1048576 123 11\n").unwrap();
        d.close(h).unwrap();

        assert!(d.stat(loc, "obj1").is_ok());

        let mut h = d.open(DalMode::Read, loc, "obj1").unwrap();
        let mut buf = [0u8; 11];
        let n = d.get(&mut h, &mut buf, 0).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");

        let mut meta_buf = vec![0u8; 64];
        let n = d.get_meta(&mut h, &mut meta_buf).unwrap();
        assert_eq!(&meta_buf[..n], b"v1 3 1 0 4096 1048576 1048576 123 11\n");
    }

    #[test]
    fn abort_leaves_no_final_path() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let loc = Location::new(1, 0, 0, 0);
        let mut h = d.open(DalMode::Write, loc, "objA").unwrap();
        d.put(&mut h, b"partial").unwrap();
        d.abort(h).unwrap();
        assert!(d.stat(loc, "objA").is_err());
    }

    #[test]
    fn del_is_idempotent_on_missing_object() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let loc = Location::new(2, 0, 0, 0);
        d.del(loc, "nope").unwrap();
        d.del(loc, "nope").unwrap();
    }

    #[test]
    fn migrate_refuses_block_only_change() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let src = Location::new(0, 0, 0, 0);
        let dst = Location::new(0, 1, 0, 0);
        let result = d.migrate("obj", src, dst, true);
        assert!(matches!(result, Err(DalError::InvalidMigration(_))));
    }

    #[test]
    fn migrate_offline_hardlinks_and_invalidates_source() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let src = Location::new(0, 0, 0, 0);
        let dst = Location::new(1, 0, 0, 0);

        let mut h = d.open(DalMode::Write, src, "obj2").unwrap();
        d.put(&mut h, b"migrate me").unwrap();
        d.set_meta(&mut h, b"v1 1 0 0 1 1 1 1 1\n").unwrap();
        d.close(h).unwrap();

        let outcome = d.migrate("obj2", src, dst, true).unwrap();
        assert_eq!(outcome, MigrateOutcome::Complete);
        assert!(d.stat(dst, "obj2").is_ok());
        assert!(d.stat(src, "obj2").is_err());
    }

    #[test]
    fn migrate_online_leaves_symlink_and_keeps_source() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dal(&tmp);
        let src = Location::new(0, 0, 0, 0);
        let dst = Location::new(1, 0, 0, 0);

        let mut h = d.open(DalMode::Write, src, "obj3").unwrap();
        d.put(&mut h, b"shared").unwrap();
        d.set_meta(&mut h, b"v1 1 0 0 1 1 1 1 1\n").unwrap();
        d.close(h).unwrap();

        d.migrate("obj3", src, dst, false).unwrap();
        assert!(d.stat(src, "obj3").is_ok());

        let mut h = d.open(DalMode::Read, dst, "obj3").unwrap();
        let mut buf = [0u8; 6];
        d.get(&mut h, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"shared");
    }
}
