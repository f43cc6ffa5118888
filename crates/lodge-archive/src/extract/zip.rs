use std::io::{Read, Seek};
use std::path::PathBuf;

use tracing::debug;

use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{Error, Result};
use crate::extract::{EntrySource, PendingEntry};
use crate::format::ArchiveFormat;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Link targets are stored as file data; anything longer is not a path.
const MAX_LINK_TARGET: u64 = 4096;

pub struct ZipSource<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
    index: usize,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = zip::ZipArchive::new(reader).map_err(|e| {
            debug!(error = %e, "unreadable zip central directory");
            Error::Corrupted
        })?;
        Ok(Self { archive, index: 0 })
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    type Reader<'a>
        = zip::read::ZipFile<'a, R>
    where
        Self: 'a;

    fn next_entry(&mut self) -> Option<Result<PendingEntry<Self::Reader<'_>>>> {
        if self.index >= self.archive.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let mut file = match self.archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                debug!(index, error = %e, "bad zip entry");
                return Some(Err(Error::Corrupted));
            }
        };

        // Raw name on purpose: traversal checks happen in the engine.
        let path = PathBuf::from(file.name().replace('\\', "/"));
        let mode = file.unix_mode();
        let is_symlink = mode.is_some_and(|m| m & S_IFMT == S_IFLNK);

        let entry = if file.is_dir() {
            ArchiveEntry::new(path, EntryKind::Directory, 0)
        } else if is_symlink {
            let mut target = String::new();
            if (&mut file)
                .take(MAX_LINK_TARGET)
                .read_to_string(&mut target)
                .is_err()
            {
                return Some(Err(Error::InvalidPath));
            }
            ArchiveEntry::new(path, EntryKind::Symlink, 0).with_link_target(target)
        } else {
            ArchiveEntry::new(path, EntryKind::File, file.size())
        };

        Some(Ok(PendingEntry {
            entry: entry.with_mode(mode),
            data: file,
        }))
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }
}
