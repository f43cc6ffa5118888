use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

use crate::error::SelectError;

const ELF_MAGIC: &[u8] = b"\x7fELF";
const SHEBANG: &[u8] = b"#!";

/// Executable files below `root` that look like native binaries or scripts.
///
/// Symlinks are not followed. The result is sorted.
pub fn find_candidates(root: &Path) -> Result<Vec<PathBuf>, SelectError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !is_executable(&metadata) {
            continue;
        }
        if has_executable_signature(entry.path()) {
            found.push(entry.into_path());
        } else {
            trace!(path = %entry.path().display(), "executable bit without binary signature");
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

fn has_executable_signature(path: &Path) -> bool {
    let mut head = Vec::with_capacity(ELF_MAGIC.len());
    match File::open(path).and_then(|f| f.take(ELF_MAGIC.len() as u64).read_to_end(&mut head)) {
        Ok(_) => head.starts_with(ELF_MAGIC) || head.starts_with(SHEBANG),
        Err(_) => false,
    }
}
