//! The secure-root containment primitive.
//!
//! All POSIX DAL file operations go through `*at()` syscalls relative to a
//! single directory file descriptor opened once at DAL init, rather than by
//! concatenating and resolving full paths — this is what makes path
//! components supplied by `dir_template`/`objID` safe even if an adversarial
//! or buggy caller sneaks a `..` past the template expansion: the kernel
//! resolves every relative path underneath `sec_root`'s fd, so a `..` can at
//! worst escape to a sibling directory still inside the managed tree, never
//! above the secure root itself (POSIX does not provide true chroot-style
//! containment through `*at()` alone, but combined with `verify(OWNERCHECK)`
//! this is still the right trust model for a file-per-shard backend).

use crate::error::{DalError, Result};
use nix::dir::Dir;
use nix::fcntl::{openat, OFlag};
use nix::sys::stat::{fstatat, mkdirat, Mode};
use nix::unistd::{fchownat, linkat, renameat, symlinkat, unlinkat, FchownatFlags, LinkatFlags, UnlinkatFlags};
use parking_lot::Mutex;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

/// Mode every managed directory (and the secure root itself) must carry.
pub const SECURE_DIR_MODE: Mode = Mode::S_IRWXU;

/// Additional world-exec/world-write bits the storage daemon requires on leaf
/// scatter directories, applied during `verify`.
pub const LEAF_EXTRA_MODE: Mode = Mode::from_bits_truncate(Mode::S_IWGRP.bits() | Mode::S_IXGRP.bits() | Mode::S_IWOTH.bits() | Mode::S_IXOTH.bits());

/// A directory file descriptor through which every path this DAL touches is
/// resolved. Opened once at DAL init; never re-derived from a string path
/// after that.
pub struct SecureRoot {
    root: Mutex<Dir>,
    path: PathBuf,
}

impl SecureRoot {
    /// Opens `path` as the secure root, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }
        let dir = Dir::open(&path, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())
            .map_err(|e| DalError::SecureRootViolation(format!("failed to open secure root {}: {e}", path.display())))?;
        Ok(Self {
            root: Mutex::new(dir),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.root.lock().as_raw_fd()
    }

    /// Opens `rel` relative to the secure root.
    pub fn open_at(&self, rel: &Path, oflag: OFlag, mode: Mode) -> Result<File> {
        let raw = openat(self.fd(), rel, oflag, mode)?;
        // SAFETY: `openat` returns a freshly-opened, uniquely-owned fd.
        let owned = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(File::from(owned))
    }

    /// Creates the single directory `rel` (not its ancestors) with `mode`.
    /// `EEXIST` is treated as success.
    pub fn mkdir_at(&self, rel: &Path, mode: Mode) -> Result<()> {
        match mkdirat(Some(self.fd()), rel, mode) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::EEXIST) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates every ancestor directory of `rel` (i.e. `rel`'s parent chain),
    /// mkdir -p style, relative to the secure root.
    pub fn ensure_dirs_at(&self, rel: &Path, mode: Mode) -> Result<()> {
        let mut built = PathBuf::new();
        if let Some(parent) = rel.parent() {
            for component in parent.components() {
                built.push(component);
                self.mkdir_at(&built, mode)?;
            }
        }
        Ok(())
    }

    /// Removes `rel`. `ENOENT` is treated as success: absence of the target
    /// is itself a successful deletion.
    pub fn unlink_at(&self, rel: &Path) -> Result<()> {
        match unlinkat(Some(self.fd()), rel, UnlinkatFlags::NoRemoveDir) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ENOENT) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically renames `from` to `to`, both relative to the secure root.
    pub fn rename_at(&self, from: &Path, to: &Path) -> Result<()> {
        let fd = Some(self.fd());
        renameat(fd, from, fd, to)?;
        Ok(())
    }

    /// Hardlinks `from` to `to`. Used by `migrate`'s offline path before
    /// falling back to a manual copy on `EXDEV`.
    pub fn link_at(&self, from: &Path, to: &Path) -> Result<()> {
        let fd = Some(self.fd());
        linkat(fd, from, fd, to, LinkatFlags::NoSymlinkFollow)?;
        Ok(())
    }

    /// Creates a relative symlink at `to`, pointing at `target` (a path
    /// relative to `to`'s own directory — computed by the caller). Used by
    /// `migrate`'s online path.
    pub fn symlink_at(&self, target: &Path, to: &Path) -> Result<()> {
        symlinkat(target, Some(self.fd()), to)?;
        Ok(())
    }

    /// `Ok(true)` iff `rel` exists (following symlinks).
    pub fn exists_at(&self, rel: &Path) -> bool {
        fstatat(self.fd(), rel, nix::fcntl::AtFlags::empty()).is_ok()
    }

    /// Stats `rel` relative to the secure root, without following a trailing
    /// symlink.
    pub fn lstat_at(&self, rel: &Path) -> Result<nix::sys::stat::FileStat> {
        Ok(fstatat(self.fd(), rel, nix::fcntl::AtFlags::AT_SYMLINK_NOFOLLOW)?)
    }

    /// Ensures `rel` (an existing directory, relative to the secure root) has
    /// exactly `mode` and is owned by the current effective uid/gid; with
    /// `fix`, corrects ownership and mode rather than merely reporting them.
    /// Returns `true` iff a problem was found (and, if `fix`, corrected).
    pub fn check_dir_mode(&self, rel: &Path, mode: Mode, fix: bool) -> Result<bool> {
        let st = self.lstat_at(rel)?;
        let current_mode = Mode::from_bits_truncate(st.st_mode) & Mode::from_bits_truncate(0o7777);
        let mut problem = current_mode != mode;
        let euid = nix::unistd::geteuid();
        let egid = nix::unistd::getegid();
        if nix::unistd::Uid::from_raw(st.st_uid) != euid || nix::unistd::Gid::from_raw(st.st_gid) != egid {
            problem = true;
            if fix {
                fchownat(
                    Some(self.fd()),
                    rel,
                    Some(euid),
                    Some(egid),
                    FchownatFlags::NoFollowSymlink,
                )?;
            }
        }
        if fix && current_mode != mode {
            nix::sys::stat::fchmodat(Some(self.fd()), rel, mode, nix::sys::stat::FchmodatFlags::FollowSymlink)?;
        }
        Ok(problem)
    }

    /// Walks the ancestry of the secure root itself (outside the managed
    /// tree), checking that every parent directory up to the filesystem root
    /// is owned by the running user/group and carries mode `0700`. With
    /// `fix`, repairs what it can; directories outside the secure root that
    /// the process does not own cannot be repaired and are reported, not fixed.
    ///
    /// Returns the count of ancestor directories that failed the check.
    pub fn verify_ancestry(&self, fix: bool) -> Result<u64> {
        let mut problems = 0u64;
        let mut current = openat(libc::AT_FDCWD, &self.path, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())?;
        loop {
            let here = nix::sys::stat::fstat(current)?;
            let parent = openat(current, "..", OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())?;
            let up = nix::sys::stat::fstat(parent)?;
            let reached_fs_root = here.st_dev == up.st_dev && here.st_ino == up.st_ino;
            if reached_fs_root {
                let _ = nix::unistd::close(parent);
                let _ = nix::unistd::close(current);
                break;
            }

            let mode = Mode::from_bits_truncate(up.st_mode) & Mode::from_bits_truncate(0o7777);
            let euid = nix::unistd::geteuid();
            let egid = nix::unistd::getegid();
            let owner_ok = nix::unistd::Uid::from_raw(up.st_uid) == euid && nix::unistd::Gid::from_raw(up.st_gid) == egid;
            let mode_ok = mode == SECURE_DIR_MODE;
            if !owner_ok || !mode_ok {
                problems += 1;
                tracing::warn!(owner_ok, mode_ok, "secure root ancestor failed OWNERCHECK");
                if fix {
                    if !owner_ok {
                        let _ = nix::unistd::fchown(parent, Some(euid), Some(egid));
                    }
                    if !mode_ok {
                        let _ = nix::sys::stat::fchmod(parent, SECURE_DIR_MODE);
                    }
                }
            }

            let _ = nix::unistd::close(current);
            current = parent;
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dirs_and_mkdir_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = SecureRoot::open(tmp.path()).unwrap();
        let rel = Path::new("1/2/3/4/obj");
        root.ensure_dirs_at(rel, SECURE_DIR_MODE).unwrap();
        root.ensure_dirs_at(rel, SECURE_DIR_MODE).unwrap();
        assert!(tmp.path().join("1/2/3/4").is_dir());
    }

    #[test]
    fn unlink_missing_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let root = SecureRoot::open(tmp.path()).unwrap();
        root.unlink_at(Path::new("nope")).unwrap();
    }

    #[test]
    fn rename_moves_file_into_place() {
        let tmp = tempfile::tempdir().unwrap();
        let root = SecureRoot::open(tmp.path()).unwrap();
        let working = root.open_at(Path::new("x.partial"), OFlag::O_WRONLY | OFlag::O_CREAT, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        drop(working);
        root.rename_at(Path::new("x.partial"), Path::new("x")).unwrap();
        assert!(tmp.path().join("x").exists());
        assert!(!tmp.path().join("x.partial").exists());
    }
}
