use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive format")]
    UnsupportedFormat,

    #[error("path traversal detected: entry '{entry}' resolves to '{resolved}'")]
    PathTraversal { entry: PathBuf, resolved: PathBuf },

    #[error("symlink target escapes base directory: '{target}' -> '{resolved}'")]
    SymlinkEscape { target: PathBuf, resolved: PathBuf },

    #[error(
        "archive bomb protection triggered: extracted size {attempted} exceeds limit of {limit} bytes"
    )]
    SizeLimitExceeded { attempted: u64, limit: u64 },

    #[error("archive bomb protection triggered: more than {limit} files")]
    FileCountExceeded { limit: u64 },

    #[error(
        "archive bomb protection triggered: compression ratio too high \
         ({extracted} bytes from {compressed} compressed, limit {ratio}:1)"
    )]
    CompressionRatioExceeded {
        extracted: u64,
        compressed: u64,
        ratio: u64,
    },

    #[error(
        "archive bomb protection triggered: entry of {size} bytes exceeds per-file limit of {limit} bytes"
    )]
    IndividualFileTooLarge { size: u64, limit: u64 },

    #[error("entry path contains null byte")]
    InvalidPath,

    #[error("strip_components({count}) removed all path components from '{original}'")]
    NoComponentsRemaining { original: PathBuf, count: usize },

    #[error("archive is corrupted")]
    Corrupted,

    #[error("extraction cancelled")]
    Cancelled,

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory: {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to create symlink '{link}' -> '{target}': {source}")]
    SymlinkCreationFailed {
        target: PathBuf,
        link: PathBuf,
        source: io::Error,
    },

    #[error("failed to create hard link '{link}' -> '{target}': {source}")]
    HardlinkCreationFailed {
        target: PathBuf,
        link: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Fs(#[from] lodge_fs::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the resource-limit violations.
    pub fn is_bomb(&self) -> bool {
        matches!(
            self,
            Self::SizeLimitExceeded { .. }
                | Self::FileCountExceeded { .. }
                | Self::CompressionRatioExceeded { .. }
                | Self::IndividualFileTooLarge { .. }
        )
    }

    /// True for entries that tried to leave the destination directory.
    pub fn is_escape(&self) -> bool {
        matches!(self, Self::PathTraversal { .. } | Self::SymlinkEscape { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
