//! Containment checks for entry paths and link targets.
//!
//! Lexical checks run first and never touch the filesystem. [`ensure_contained`]
//! repeats the check against the real directory tree right before a write.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Result of sanitizing an archive entry path.
#[derive(Clone, Debug)]
pub struct SanitizedPath {
    pub original: PathBuf,
    pub resolved: PathBuf,
}

/// Resolve an archive-relative entry path below `base`.
///
/// Absolute paths and any `..` segment are rejected, even one that would
/// stay inside `base` after normalization.
pub fn sanitize_path<P: AsRef<Path>, B: AsRef<Path>>(entry: P, base: B) -> Result<SanitizedPath> {
    let entry = entry.as_ref();
    let base = base.as_ref();
    reject_nul(entry.as_os_str())?;

    let mut relative = PathBuf::new();
    for component in entry.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathTraversal {
                    entry: entry.to_path_buf(),
                    resolved: normalize_path(&base.join(entry)),
                });
            }
        }
    }

    let resolved = base.join(relative);
    if !resolved.starts_with(base) {
        return Err(Error::PathTraversal {
            entry: entry.to_path_buf(),
            resolved,
        });
    }

    Ok(SanitizedPath {
        original: entry.to_path_buf(),
        resolved,
    })
}

/// Resolve where a symlink at `link` pointing to `target` would lead.
///
/// Relative targets resolve against the link's parent directory. The
/// normalized location must stay inside `base`.
pub fn sanitize_symlink_target<P: AsRef<Path>, L: AsRef<Path>, B: AsRef<Path>>(
    target: P,
    link: L,
    base: B,
) -> Result<PathBuf> {
    let target = target.as_ref();
    let link = link.as_ref();
    let base = base.as_ref();
    reject_nul(target.as_os_str())?;

    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent().unwrap_or(base).join(target)
    };
    let resolved = normalize_path(&joined);

    if !resolved.starts_with(base) {
        return Err(Error::SymlinkEscape {
            target: target.to_path_buf(),
            resolved,
        });
    }

    Ok(resolved)
}

/// Check where a symlink at `link` pointing to `target` leads on disk.
///
/// Unlike [`sanitize_symlink_target`], symlinks already present below `root`
/// are followed, so a link placed through an earlier in-archive symlink is
/// judged by the directory it really lands in. `root` must be canonical.
pub fn ensure_link_contained(link: &Path, target: &Path, root: &Path) -> Result<PathBuf> {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent().unwrap_or(root).join(target)
    };
    let resolved = resolve_on_disk(&joined);

    if !resolved.starts_with(root) {
        return Err(Error::SymlinkEscape {
            target: target.to_path_buf(),
            resolved,
        });
    }
    Ok(resolved)
}

/// Canonicalize the deepest existing prefix of `path` and normalize the rest.
fn resolve_on_disk(path: &Path) -> PathBuf {
    let mut existing = path;
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let rest = path.strip_prefix(existing).unwrap_or(Path::new(""));
            return normalize_path(&canonical.join(rest));
        }
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return normalize_path(path),
        }
    }
}

/// Drop `count` leading components, like `tar --strip-components`.
///
/// Absolute paths and `..` segments are rejected before anything is dropped.
pub fn strip_path_components(path: &Path, count: usize) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(_) => components.push(component),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathTraversal {
                    entry: path.to_path_buf(),
                    resolved: normalize_path(path),
                });
            }
        }
    }
    if components.len() <= count {
        return Err(Error::NoComponentsRemaining {
            original: path.to_path_buf(),
            count,
        });
    }
    Ok(components[count..].iter().collect())
}

/// Check the on-disk location of `path` against the canonical `root`.
///
/// The deepest existing ancestor of `path` is canonicalized, so a symlinked
/// directory already present below `root` cannot redirect a write elsewhere.
pub fn ensure_contained(path: &Path, root: &Path, entry: &Path) -> Result<()> {
    let mut probe = path;
    let canonical = loop {
        match probe.canonicalize() {
            Ok(canonical) => break canonical,
            Err(_) => match probe.parent() {
                Some(parent) => probe = parent,
                None => return Ok(()),
            },
        }
    };

    if canonical.starts_with(root) {
        Ok(())
    } else {
        Err(Error::PathTraversal {
            entry: entry.to_path_buf(),
            resolved: canonical,
        })
    }
}

/// Lexically resolve `.` and `..`. `..` never climbs above the root.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }
    result
}

fn reject_nul(path: &OsStr) -> Result<()> {
    if path.as_encoded_bytes().contains(&0) {
        return Err(Error::InvalidPath);
    }
    Ok(())
}
