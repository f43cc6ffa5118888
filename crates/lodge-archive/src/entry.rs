use std::path::PathBuf;

use crate::format::ArchiveFormat;

/// Kind of an archive record, independent of the container format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Hardlink,
    /// Devices, fifos, sockets and anything else. Skipped during extraction.
    Other,
}

/// Header data for one tar header or zip record.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: Option<u32>,
    pub link_target: Option<PathBuf>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            size,
            mode: None,
            link_target: None,
        }
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_link_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.link_target = Some(target.into());
        self
    }
}

/// Counters for a finished extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractReport {
    pub format: ArchiveFormat,
    pub entry_count: u64,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub skipped: u64,
    pub total_bytes: u64,
}

impl ExtractReport {
    pub(crate) fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            entry_count: 0,
            files: 0,
            directories: 0,
            symlinks: 0,
            hardlinks: 0,
            skipped: 0,
            total_bytes: 0,
        }
    }

    pub(crate) fn record(&mut self, kind: &EntryKind) {
        self.entry_count += 1;
        match kind {
            EntryKind::Directory => self.directories += 1,
            EntryKind::File => self.files += 1,
            EntryKind::Symlink => self.symlinks += 1,
            EntryKind::Hardlink => self.hardlinks += 1,
            EntryKind::Other => self.skipped += 1,
        }
    }
}
