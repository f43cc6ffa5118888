//! Filesystem primitives shared by the lodge crates.
//!
//! Everything here is synchronous and returns [`Error`] values that carry the
//! offending path, so compensating actions can report exactly what they
//! failed to undo.

mod error;
pub mod permissions;

pub use error::{Error, Result};
pub use permissions::PermissionMode;

use std::fs;
use std::io;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicWriteOptions {
    pub permissions: Option<PermissionMode>,
    pub sync: bool,
}

impl AtomicWriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissions(mut self, mode: PermissionMode) -> Self {
        self.permissions = Some(mode);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Write `content` to a sibling temp file and rename it over `path`.
///
/// Readers observe either the old file or the complete new one.
pub fn atomic_write(
    path: impl AsRef<Path>,
    content: &[u8],
    options: AtomicWriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| Error::Write {
        path: path.to_path_buf(),
        source: io::Error::other("no parent directory"),
    })?;

    let tmp_path = parent.join(format!(".tmp.{}.lodge", uuid::Uuid::new_v4()));

    fs::write(&tmp_path, content).map_err(|e| Error::Write {
        path: tmp_path.clone(),
        source: e,
    })?;

    if let Some(mode) = options.permissions {
        if let Err(e) = mode.apply_to_path(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    }

    if options.sync {
        let synced = fs::File::open(&tmp_path).and_then(|f| f.sync_all());
        if let Err(e) = synced {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Write {
                path: tmp_path,
                source: e,
            });
        }
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove a file, symlink or directory tree.
///
/// Returns `Ok(false)` when nothing existed at `path`. Symlinks are removed
/// themselves, never followed.
pub fn remove_path(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(Error::Remove {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_content() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.desktop");
        atomic_write(&path, b"old", AtomicWriteOptions::new())?;
        atomic_write(&path, b"new", AtomicWriteOptions::new().sync(true))?;
        assert_eq!(read(&path)?, b"new");
        Ok(())
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() -> Result<()> {
        let dir = tempdir().unwrap();
        atomic_write(dir.path().join("a"), b"1", AtomicWriteOptions::new())?;
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a")]);
        Ok(())
    }

    #[test]
    fn atomic_write_missing_parent_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("file");
        let err = atomic_write(&path, b"x", AtomicWriteOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }

    #[test]
    fn remove_path_handles_missing() -> Result<()> {
        let dir = tempdir().unwrap();
        assert!(!remove_path(dir.path().join("nothing"))?);
        Ok(())
    }

    #[test]
    fn remove_path_removes_tree() -> Result<()> {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("app");
        fs::create_dir_all(tree.join("bin")).unwrap();
        fs::write(tree.join("bin/app"), b"x").unwrap();
        assert!(remove_path(&tree)?);
        assert!(!tree.exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn remove_path_does_not_follow_symlinks() -> Result<()> {
        let dir = tempdir().unwrap();
        let target = dir.path().join("keep");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("file"), b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(remove_path(&link)?);
        assert!(target.join("file").exists());
        Ok(())
    }
}
