//! Extraction engine shared by every container format.
//!
//! Each format only provides an [`EntrySource`]; path validation, limits,
//! and writing are identical for all of them. A failed call leaves whatever
//! it already wrote in place.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use lodge_fs::PermissionMode;
use tracing::{debug, instrument, trace, warn};

use crate::entry::{ArchiveEntry, EntryKind, ExtractReport};
use crate::error::{Error, Result};
use crate::format::{ArchiveFormat, TarCompress};
use crate::limits::ResourceLimiter;
use crate::options::{ExtractOptions, Progress};
use crate::sanitize::{
    ensure_contained, ensure_link_contained, sanitize_path, sanitize_symlink_target,
    strip_path_components,
};

mod tar;
mod zip;

pub use self::tar::{TarArchive, TarSource};
pub use self::zip::ZipSource;

/// An entry read from the archive whose data has not been consumed yet.
pub struct PendingEntry<Rd> {
    pub entry: ArchiveEntry,
    pub data: Rd,
}

/// Archive-specific entry stream.
///
/// Entries are handed out one at a time and borrow the source, so the whole
/// entry list is never held in memory.
pub trait EntrySource {
    type Reader<'a>: Read
    where
        Self: 'a;

    fn next_entry(&mut self) -> Option<Result<PendingEntry<Self::Reader<'_>>>>;

    fn format(&self) -> ArchiveFormat;
}

/// Extract `archive` of a known `format` into `destination`.
#[instrument(level = "debug", skip(options), err)]
pub fn extract(
    format: ArchiveFormat,
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    let file = File::open(archive).map_err(|e| Error::ExtractionFailed {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let compressed_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let reader = BufReader::new(file);

    let report = match format {
        ArchiveFormat::Zip => {
            let mut source = ZipSource::new(reader)?;
            extract_from_source(&mut source, destination, compressed_size, options)?
        }
        ArchiveFormat::Tar(codec) => {
            let mut archive = TarArchive::new(reader, codec);
            let mut source = archive.entries()?;
            extract_from_source(&mut source, destination, compressed_size, options)?
        }
    };

    debug!(
        files = report.files,
        bytes = report.total_bytes,
        "extracted {} entries",
        report.entry_count
    );
    Ok(report)
}

pub fn extract_tar(archive: &Path, destination: &Path) -> Result<ExtractReport> {
    extract_tar_with(archive, destination, &ExtractOptions::default())
}

pub fn extract_tar_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    extract(ArchiveFormat::Tar(TarCompress::None), archive, destination, options)
}

pub fn extract_tar_gz(archive: &Path, destination: &Path) -> Result<ExtractReport> {
    extract_tar_gz_with(archive, destination, &ExtractOptions::default())
}

pub fn extract_tar_gz_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    extract(ArchiveFormat::Tar(TarCompress::Gzip), archive, destination, options)
}

pub fn extract_tar_xz(archive: &Path, destination: &Path) -> Result<ExtractReport> {
    extract_tar_xz_with(archive, destination, &ExtractOptions::default())
}

pub fn extract_tar_xz_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    extract(ArchiveFormat::Tar(TarCompress::Xz), archive, destination, options)
}

pub fn extract_tar_bz2(archive: &Path, destination: &Path) -> Result<ExtractReport> {
    extract_tar_bz2_with(archive, destination, &ExtractOptions::default())
}

pub fn extract_tar_bz2_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    extract(ArchiveFormat::Tar(TarCompress::Bzip2), archive, destination, options)
}

pub fn extract_zip(archive: &Path, destination: &Path) -> Result<ExtractReport> {
    extract_zip_with(archive, destination, &ExtractOptions::default())
}

pub fn extract_zip_with(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    extract(ArchiveFormat::Zip, archive, destination, options)
}

/// Main extraction loop.
///
/// `compressed_size` is the archive's size on disk (0 if unknown) and feeds
/// the compression-ratio check.
pub fn extract_from_source<S: EntrySource>(
    source: &mut S,
    destination: &Path,
    compressed_size: u64,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    fs::create_dir_all(destination).map_err(|e| Error::DirectoryCreationFailed {
        path: destination.to_path_buf(),
        source: e,
    })?;
    let root = destination
        .canonicalize()
        .map_err(|e| Error::ExtractionFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

    let mut limiter = ResourceLimiter::new(options.limits, compressed_size);
    let mut report = ExtractReport::new(source.format());
    let mut links = Vec::new();

    while let Some(next) = source.next_entry() {
        if options.is_cancelled() {
            warn!(entries = report.entry_count, "extraction cancelled");
            return Err(Error::Cancelled);
        }

        let PendingEntry { entry, data } = next?;

        let relative = match strip(&entry.path, options.strip_components)? {
            Some(relative) => relative,
            None => {
                trace!(entry = %entry.path.display(), "stripped to nothing, skipping");
                report.record(&EntryKind::Other);
                continue;
            }
        };
        let target = sanitize_path(&relative, &root)?.resolved;

        match entry.kind {
            EntryKind::Directory => create_directory(&target, &root, &entry)?,
            EntryKind::File => {
                if let Err(e) = limiter.check_limits(entry.size) {
                    warn!(entry = %entry.path.display(), size = entry.size, "{e}");
                    return Err(e);
                }
                write_file(data, &target, &root, &entry)?;
            }
            EntryKind::Symlink => {
                let placed = write_symlink(&target, &root, &entry)?;
                links.push((placed, entry.path.clone()));
            }
            EntryKind::Hardlink => write_hardlink(&target, &root, &entry, options)?,
            EntryKind::Other => {
                trace!(entry = %entry.path.display(), "skipping special file");
            }
        }

        report.record(&entry.kind);

        if let Some(ref callback) = options.on_progress {
            callback(Progress {
                entries_processed: report.entry_count,
                bytes_written: limiter.total_bytes_written(),
                current_entry: entry.path.clone(),
            });
        }
    }

    verify_links(&links, &root)?;

    report.total_bytes = limiter.total_bytes_written();
    Ok(report)
}

/// Re-check every created symlink against the finished tree.
///
/// A later entry can turn a component of an earlier relative target into a
/// symlink. An escaping link is removed before the error is returned.
fn verify_links(links: &[(PathBuf, PathBuf)], root: &Path) -> Result<()> {
    for (placed, archived) in links {
        let Ok(link_target) = fs::read_link(placed) else {
            continue;
        };
        if let Err(e) = ensure_link_contained(placed, &link_target, root) {
            warn!(entry = %archived.display(), "{e}");
            lodge_fs::remove_path(placed)?;
            return Err(e);
        }
    }
    Ok(())
}

fn strip(path: &Path, count: usize) -> Result<Option<PathBuf>> {
    if count == 0 {
        return Ok(Some(path.to_path_buf()));
    }
    match strip_path_components(path, count) {
        Ok(stripped) => Ok(Some(stripped)),
        Err(Error::NoComponentsRemaining { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create the parent of `target`, checking containment before and after.
fn prepare_parent(target: &Path, root: &Path, entry: &ArchiveEntry) -> Result<()> {
    let parent = target.parent().unwrap_or(root);
    ensure_contained(parent, root, &entry.path)?;
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| Error::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    ensure_contained(parent, root, &entry.path)
}

/// Remove a non-directory already sitting at `target` so it is replaced
/// rather than written through.
fn clear_target(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if !meta.is_dir() => {
            lodge_fs::remove_path(target)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn create_directory(target: &Path, root: &Path, entry: &ArchiveEntry) -> Result<()> {
    ensure_contained(target, root, &entry.path)?;
    if !target.is_dir() {
        fs::create_dir_all(target).map_err(|e| Error::DirectoryCreationFailed {
            path: target.to_path_buf(),
            source: e,
        })?;
    }
    ensure_contained(target, root, &entry.path)?;
    PermissionMode::archived_dir(entry.mode).apply_to_path(target)?;
    Ok(())
}

fn write_file<Rd: Read>(data: Rd, target: &Path, root: &Path, entry: &ArchiveEntry) -> Result<()> {
    prepare_parent(target, root, entry)?;
    clear_target(target)?;

    let extraction_failed = |e: io::Error| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source: e,
    };

    let file = File::create(target).map_err(extraction_failed)?;
    let mut writer = BufWriter::new(file);
    let mut limited = data.take(entry.size);
    let written = io::copy(&mut limited, &mut writer).map_err(extraction_failed)?;
    writer.flush().map_err(extraction_failed)?;

    if written != entry.size {
        debug!(
            entry = %entry.path.display(),
            declared = entry.size,
            written,
            "entry data shorter than declared size"
        );
        return Err(Error::Corrupted);
    }

    let trailing = limited
        .into_inner()
        .read(&mut [0u8; 1])
        .map_err(extraction_failed)?;
    if trailing != 0 {
        debug!(
            entry = %entry.path.display(),
            declared = entry.size,
            "entry data longer than declared size"
        );
        return Err(Error::Corrupted);
    }

    PermissionMode::archived_file(entry.mode).apply_to_path(target)?;
    Ok(())
}

/// Create a symlink and return where it was really placed.
fn write_symlink(target: &Path, root: &Path, entry: &ArchiveEntry) -> Result<PathBuf> {
    let link_target = entry.link_target.as_deref().ok_or(Error::InvalidPath)?;
    sanitize_symlink_target(link_target, target, root)?;

    prepare_parent(target, root, entry)?;
    let parent = target.parent().unwrap_or(root);
    let placed = match (parent.canonicalize(), target.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        (Err(e), _) => {
            return Err(Error::ExtractionFailed {
                path: parent.to_path_buf(),
                source: e,
            });
        }
        (_, None) => return Err(Error::InvalidPath),
    };
    ensure_link_contained(&placed, link_target, root)?;
    clear_target(&placed)?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(link_target, &placed).map_err(|e| Error::SymlinkCreationFailed {
        target: link_target.to_path_buf(),
        link: placed.clone(),
        source: e,
    })?;

    #[cfg(not(unix))]
    return Err(Error::SymlinkCreationFailed {
        target: link_target.to_path_buf(),
        link: target.to_path_buf(),
        source: io::Error::from(io::ErrorKind::Unsupported),
    });

    #[cfg(unix)]
    Ok(placed)
}

fn write_hardlink(
    target: &Path,
    root: &Path,
    entry: &ArchiveEntry,
    options: &ExtractOptions,
) -> Result<()> {
    let link_target = entry.link_target.as_deref().ok_or(Error::InvalidPath)?;
    let relative = strip(link_target, options.strip_components)?.ok_or_else(|| {
        Error::NoComponentsRemaining {
            original: link_target.to_path_buf(),
            count: options.strip_components,
        }
    })?;
    let source = sanitize_path(&relative, root)?.resolved;
    ensure_contained(&source, root, link_target)?;

    prepare_parent(target, root, entry)?;
    clear_target(target)?;

    fs::hard_link(&source, target).map_err(|e| Error::HardlinkCreationFailed {
        target: source.clone(),
        link: target.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ExtractLimits;
    use std::io::Cursor;

    /// In-memory source for exercising the engine without a real container.
    struct VecSource {
        entries: std::vec::IntoIter<(ArchiveEntry, Vec<u8>)>,
    }

    impl VecSource {
        fn new(entries: Vec<(ArchiveEntry, Vec<u8>)>) -> Self {
            Self {
                entries: entries.into_iter(),
            }
        }
    }

    impl EntrySource for VecSource {
        type Reader<'a> = Cursor<Vec<u8>>;

        fn next_entry(&mut self) -> Option<Result<PendingEntry<Self::Reader<'_>>>> {
            let (entry, data) = self.entries.next()?;
            Some(Ok(PendingEntry {
                entry,
                data: Cursor::new(data),
            }))
        }

        fn format(&self) -> ArchiveFormat {
            ArchiveFormat::Tar(TarCompress::None)
        }
    }

    fn file(path: &str, data: &[u8]) -> (ArchiveEntry, Vec<u8>) {
        (
            ArchiveEntry::new(path, EntryKind::File, data.len() as u64).with_mode(Some(0o644)),
            data.to_vec(),
        )
    }

    #[test]
    fn writes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = VecSource::new(vec![
            (ArchiveEntry::new("app/", EntryKind::Directory, 0), Vec::new()),
            file("app/bin/tool", b"binary"),
        ]);

        let report =
            extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default()).unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.directories, 1);
        assert_eq!(report.total_bytes, 6);
        assert_eq!(fs::read(dir.path().join("app/bin/tool")).unwrap(), b"binary");
    }

    #[test]
    fn other_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = VecSource::new(vec![
            (ArchiveEntry::new("dev/null", EntryKind::Other, 0), Vec::new()),
            file("ok", b"1"),
        ]);

        let report =
            extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default()).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(!dir.path().join("dev").exists());
        assert!(dir.path().join("ok").exists());
    }

    #[test]
    fn short_data_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ArchiveEntry::new("short", EntryKind::File, 10);
        let mut source = VecSource::new(vec![(entry, b"abc".to_vec())]);

        let err = extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Corrupted));
    }

    #[test]
    fn long_data_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ArchiveEntry::new("long", EntryKind::File, 3);
        let mut source = VecSource::new(vec![(entry, b"abcdef".to_vec())]);

        let err = extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Corrupted));
    }

    #[test]
    fn stripping_does_not_hide_traversal() {
        let options = ExtractOptions::default().strip_components(1);
        for path in ["../etc/passwd", "/abs/file"] {
            let dir = tempfile::tempdir().unwrap();
            let mut source = VecSource::new(vec![file(path, b"x")]);

            let err = extract_from_source(&mut source, dir.path(), 0, &options).unwrap_err();
            assert!(matches!(err, Error::PathTraversal { .. }), "{path}");
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0, "{path}");
        }
    }

    #[test]
    fn limiter_failure_stops_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let options =
            ExtractOptions::default().limits(ExtractLimits::default().max_individual_file_size(4));
        let mut source = VecSource::new(vec![file("small", b"1234"), file("big", b"12345")]);

        let err = extract_from_source(&mut source, dir.path(), 0, &options).unwrap_err();
        assert!(matches!(err, Error::IndividualFileTooLarge { size: 5, limit: 4 }));
        assert!(dir.path().join("small").exists());
        assert!(!dir.path().join("big").exists());
    }

    #[test]
    fn cancellation_between_entries() {
        let dir = tempfile::tempdir().unwrap();
        let token = crate::options::CancelToken::new();
        let cancel = token.clone();
        let options = ExtractOptions::default()
            .cancel(token)
            .on_progress(std::sync::Arc::new(move |_| cancel.cancel()));
        let mut source = VecSource::new(vec![file("first", b"1"), file("second", b"2")]);

        let err = extract_from_source(&mut source, dir.path(), 0, &options).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(dir.path().join("first").exists());
        assert!(!dir.path().join("second").exists());
    }

    #[test]
    fn strip_components_skips_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExtractOptions::default().strip_components(1);
        let mut source = VecSource::new(vec![
            (ArchiveEntry::new("tool-1.0/", EntryKind::Directory, 0), Vec::new()),
            file("tool-1.0/bin/tool", b"x"),
        ]);

        let report = extract_from_source(&mut source, dir.path(), 0, &options).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(dir.path().join("bin/tool").exists());
        assert!(!dir.path().join("tool-1.0").exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_is_replaced_not_followed() {
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim");
        fs::write(&victim, b"keep").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&victim, dir.path().join("config")).unwrap();

        let mut source = VecSource::new(vec![file("config", b"overwritten")]);
        extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default()).unwrap();

        assert_eq!(fs::read(&victim).unwrap(), b"keep");
        assert_eq!(fs::read(dir.path().join("config")).unwrap(), b"overwritten");
    }

    #[cfg(unix)]
    #[test]
    fn hardlink_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let link = ArchiveEntry::new("bin/alias", EntryKind::Hardlink, 0)
            .with_link_target(PathBuf::from("bin/tool"));
        let mut source = VecSource::new(vec![file("bin/tool", b"tool"), (link, Vec::new())]);

        let report =
            extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default()).unwrap();
        assert_eq!(report.hardlinks, 1);
        assert_eq!(fs::read(dir.path().join("bin/alias")).unwrap(), b"tool");
    }

    #[test]
    fn hardlink_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let link = ArchiveEntry::new("passwd", EntryKind::Hardlink, 0)
            .with_link_target(PathBuf::from("../../etc/passwd"));
        let mut source = VecSource::new(vec![(link, Vec::new())]);

        let err = extract_from_source(&mut source, dir.path(), 0, &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));
        assert!(!dir.path().join("passwd").exists());
    }
}
