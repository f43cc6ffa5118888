use crate::{Error, Result};
use std::path::Path;

/// Permission bits to apply to an installed file or directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Leave whatever the process umask produced.
    #[default]
    Inherit,

    /// `0o755`, used for wrapper scripts and launchers.
    Executable,

    /// `0o644`.
    ReadWrite,

    /// `0o755` for directories.
    Directory,

    /// Explicit mode bits. Only the `0o777` range is honoured.
    Custom(u32),
}

impl PermissionMode {
    /// Mode for a file taken from an archive header.
    ///
    /// setuid, setgid and sticky bits are dropped and the owner always keeps
    /// read/write access so the file can be removed again on rollback.
    pub fn archived_file(mode: Option<u32>) -> Self {
        match mode {
            Some(m) => Self::Custom((m & 0o777) | 0o600),
            None => Self::ReadWrite,
        }
    }

    /// Mode for a directory taken from an archive header.
    pub fn archived_dir(mode: Option<u32>) -> Self {
        match mode {
            Some(m) => Self::Custom((m & 0o777) | 0o700),
            None => Self::Directory,
        }
    }

    pub fn unix_mode(self) -> Option<u32> {
        match self {
            Self::Inherit => None,
            Self::Executable | Self::Directory => Some(0o755),
            Self::ReadWrite => Some(0o644),
            Self::Custom(m) => Some(m & 0o777),
        }
    }

    /// Apply the mode to `path`. A no-op for `Inherit` and on non-unix targets.
    pub fn apply_to_path(self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = self.unix_mode() {
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(
                    |e| Error::Write {
                        path: path.to_path_buf(),
                        source: e,
                    },
                )?;
            }
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_file_drops_special_bits() {
        assert_eq!(PermissionMode::archived_file(Some(0o4755)), PermissionMode::Custom(0o755));
        assert_eq!(PermissionMode::archived_file(Some(0o444)), PermissionMode::Custom(0o644));
        assert_eq!(PermissionMode::archived_file(None), PermissionMode::ReadWrite);
    }

    #[test]
    fn archived_dir_keeps_owner_traversal() {
        assert_eq!(PermissionMode::archived_dir(Some(0o555)), PermissionMode::Custom(0o755));
        assert_eq!(PermissionMode::archived_dir(None), PermissionMode::Directory);
    }

    #[cfg(unix)]
    #[test]
    fn apply_sets_mode_bits() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();

        PermissionMode::Executable.apply_to_path(&path)?;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        Ok(())
    }
}
