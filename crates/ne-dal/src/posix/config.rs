//! POSIX DAL configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Open-flag set recognized for `dataflags`/`metaflags`:
/// `{O_NOATIME, O_DIRECT, O_DSYNC, O_SYNC}`, comma-separated in configuration
/// text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenFlags {
    pub noatime: bool,
    pub direct: bool,
    pub dsync: bool,
    pub sync: bool,
}

impl OpenFlags {
    /// Parses a comma-separated flag list, e.g. `"O_DIRECT,O_DSYNC"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut out = Self::default();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "O_NOATIME" => out.noatime = true,
                "O_DIRECT" => out.direct = true,
                "O_DSYNC" => out.dsync = true,
                "O_SYNC" => out.sync = true,
                other => return Err(format!("unrecognized open flag '{other}'")),
            }
        }
        Ok(out)
    }

    #[must_use]
    pub fn to_oflag(self) -> nix::fcntl::OFlag {
        let mut flags = nix::fcntl::OFlag::empty();
        if self.noatime {
            flags |= nix::fcntl::OFlag::O_NOATIME;
        }
        if self.direct {
            flags |= nix::fcntl::OFlag::O_DIRECT;
        }
        if self.dsync {
            flags |= nix::fcntl::OFlag::O_DSYNC;
        }
        if self.sync {
            flags |= nix::fcntl::OFlag::O_SYNC;
        }
        flags
    }
}

/// The bounds of the `(pod, block, cap, scatter)` hypercube `verify` walks to
/// pre-create/check leaf directories. `None` in
/// [`PosixDalConfig::verify_bounds`] skips the leaf-directory walk entirely
/// (the hypercube's extent has no generic default — it is a deployment-specific
/// fact about the storage array, not derivable from `dir_template` alone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyBounds {
    pub pods: u32,
    pub blocks: u32,
    pub caps: u32,
    pub scatters: u32,
}

/// Process configuration for the POSIX DAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosixDalConfig {
    /// Absolute path containing all managed shards.
    pub secure_root: PathBuf,
    /// Path-template string with `{p}/{b}/{c}/{s}` placeholders.
    pub dir_template: String,
    /// Default `versz` used when opening objects with no prior meta.
    pub io_size: usize,
    pub dataflags: OpenFlags,
    pub metaflags: OpenFlags,
    pub verify_bounds: Option<VerifyBounds>,
}

impl PosixDalConfig {
    #[must_use]
    pub fn new(secure_root: impl Into<PathBuf>, dir_template: impl Into<String>, io_size: usize) -> Self {
        Self {
            secure_root: secure_root.into(),
            dir_template: dir_template.into(),
            io_size,
            dataflags: OpenFlags::default(),
            metaflags: OpenFlags::default(),
            verify_bounds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_flags() {
        let flags = OpenFlags::parse("O_DIRECT, O_DSYNC").unwrap();
        assert!(flags.direct);
        assert!(flags.dsync);
        assert!(!flags.sync);
        assert!(!flags.noatime);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(OpenFlags::parse("O_BOGUS").is_err());
    }

    #[test]
    fn empty_string_is_no_flags() {
        assert_eq!(OpenFlags::parse("").unwrap(), OpenFlags::default());
    }
}
