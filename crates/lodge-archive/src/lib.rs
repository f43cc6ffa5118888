//! Hardened archive extraction.
//!
//! Every entry is validated before anything touches the disk: paths may not
//! leave the destination, symlinks may not point out of it, and the
//! [`ResourceLimiter`] aborts on archive bombs. Extraction is not
//! transactional; whatever was written before an error stays.
//!
//! # Architecture
//!
//! - `format.rs` - Format detection and tar decompressors
//! - `sanitize.rs` - Path sanitization (zip-slip prevention)
//! - `limits.rs` - Archive-bomb limits
//! - `extract/` - Shared engine plus tar and zip entry sources
//! - `entry.rs` - Entry metadata and the extraction report
//! - `options.rs` - Per-call options, progress and cancellation

pub use entry::{ArchiveEntry, EntryKind, ExtractReport};
pub use error::{Error, Result};
pub use extract::{
    EntrySource, PendingEntry, extract, extract_from_source, extract_tar, extract_tar_bz2,
    extract_tar_bz2_with, extract_tar_gz, extract_tar_gz_with, extract_tar_with, extract_tar_xz,
    extract_tar_xz_with, extract_zip, extract_zip_with,
};
pub use format::{ArchiveFormat, TarCompress, detect_archive, detect_format};
pub use limits::{
    ExtractLimits, MAX_COMPRESSION_RATIO, MAX_EXTRACTED_SIZE, MAX_FILE_COUNT,
    MAX_INDIVIDUAL_FILE_SIZE, ResourceLimiter,
};
pub use options::{CancelToken, ExtractOptions, Progress};
pub use sanitize::{
    SanitizedPath, ensure_contained, ensure_link_contained, sanitize_path, sanitize_symlink_target,
    strip_path_components,
};

pub mod entry;
mod error;
pub mod extract;
mod format;
mod limits;
pub mod options;
mod sanitize;
