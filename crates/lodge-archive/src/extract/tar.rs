use std::io::Read;

use tracing::debug;

use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{Error, Result};
use crate::extract::{EntrySource, PendingEntry};
use crate::format::{ArchiveFormat, Decoder, TarCompress};

/// A tar stream behind its decompressor.
pub struct TarArchive<R: Read> {
    archive: tar::Archive<Decoder<R>>,
    codec: TarCompress,
}

impl<R: Read> TarArchive<R> {
    pub fn new(reader: R, codec: TarCompress) -> Self {
        Self {
            archive: tar::Archive::new(codec.decoder(reader)),
            codec,
        }
    }

    pub fn entries(&mut self) -> Result<TarSource<'_, Decoder<R>>> {
        let format = ArchiveFormat::Tar(self.codec);
        let entries = self.archive.entries().map_err(|e| {
            debug!(error = %e, "unreadable tar stream");
            Error::Corrupted
        })?;
        Ok(TarSource { entries, format })
    }
}

pub struct TarSource<'a, R: 'a + Read> {
    entries: tar::Entries<'a, R>,
    format: ArchiveFormat,
}

impl<'a, R: Read + 'a> EntrySource for TarSource<'a, R> {
    // Entries borrow the archive, not the iterator.
    type Reader<'b>
        = tar::Entry<'a, R>
    where
        Self: 'b;

    fn next_entry(&mut self) -> Option<Result<PendingEntry<Self::Reader<'_>>>> {
        let entry = match self.entries.next()? {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "bad tar header");
                return Some(Err(Error::Corrupted));
            }
        };
        Some(describe(&entry).map(|meta| PendingEntry { entry: meta, data: entry }))
    }

    fn format(&self) -> ArchiveFormat {
        self.format
    }
}

fn describe<R: Read>(entry: &tar::Entry<'_, R>) -> Result<ArchiveEntry> {
    let path = entry.path().map_err(|_| Error::InvalidPath)?.into_owned();
    let header = entry.header();
    let entry_type = header.entry_type();

    let kind = if entry_type.is_dir() {
        EntryKind::Directory
    } else if entry_type.is_symlink() {
        EntryKind::Symlink
    } else if entry_type.is_hard_link() {
        EntryKind::Hardlink
    } else if entry_type.is_file() || entry_type.is_contiguous() {
        EntryKind::File
    } else {
        // Includes GNU sparse entries, whose sparse maps are not expanded.
        EntryKind::Other
    };

    let size = match kind {
        EntryKind::File => entry.size(),
        _ => 0,
    };
    let described = ArchiveEntry::new(path, kind, size).with_mode(header.mode().ok());

    if matches!(kind, EntryKind::Symlink | EntryKind::Hardlink) {
        let target = match entry.link_name() {
            Ok(Some(target)) => target.into_owned(),
            _ => return Err(Error::InvalidPath),
        };
        return Ok(described.with_link_target(target));
    }
    Ok(described)
}
