//! Archive-bomb bookkeeping for a single extraction pass.

use serde::Deserialize;

use crate::error::{Error, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Upper bound on the sum of all regular-file sizes written by one extraction.
pub const MAX_EXTRACTED_SIZE: u64 = 10 * GIB;
/// Upper bound on the number of regular files written by one extraction.
pub const MAX_FILE_COUNT: u64 = 100_000;
/// Upper bound on the declared size of a single regular file.
pub const MAX_INDIVIDUAL_FILE_SIZE: u64 = 5 * GIB;
/// Upper bound on extracted bytes per byte of the archive on disk.
pub const MAX_COMPRESSION_RATIO: u64 = 1000;

/// Thresholds enforced by [`ResourceLimiter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractLimits {
    pub max_extracted_size: u64,
    pub max_file_count: u64,
    pub max_individual_file_size: u64,
    pub max_compression_ratio: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_extracted_size: MAX_EXTRACTED_SIZE,
            max_file_count: MAX_FILE_COUNT,
            max_individual_file_size: MAX_INDIVIDUAL_FILE_SIZE,
            max_compression_ratio: MAX_COMPRESSION_RATIO,
        }
    }
}

impl ExtractLimits {
    pub fn max_extracted_size(mut self, bytes: u64) -> Self {
        self.max_extracted_size = bytes;
        self
    }

    pub fn max_file_count(mut self, count: u64) -> Self {
        self.max_file_count = count;
        self
    }

    pub fn max_individual_file_size(mut self, bytes: u64) -> Self {
        self.max_individual_file_size = bytes;
        self
    }

    pub fn max_compression_ratio(mut self, ratio: u64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }
}

/// Cumulative counters for one extraction call. Never reused.
#[derive(Debug)]
pub struct ResourceLimiter {
    limits: ExtractLimits,
    total_bytes_written: u64,
    file_count: u64,
    original_compressed_size: u64,
}

impl ResourceLimiter {
    /// `original_compressed_size` is the archive's size on disk, 0 if unknown.
    /// A zero size disables the ratio check.
    pub fn new(limits: ExtractLimits, original_compressed_size: u64) -> Self {
        Self {
            limits,
            total_bytes_written: 0,
            file_count: 0,
            original_compressed_size,
        }
    }

    /// Account for a regular file of `entry_size` bytes about to be written.
    ///
    /// On error the counters are left as they were.
    pub fn check_limits(&mut self, entry_size: u64) -> Result<()> {
        let file_count = self.file_count + 1;
        if file_count > self.limits.max_file_count {
            return Err(Error::FileCountExceeded {
                limit: self.limits.max_file_count,
            });
        }

        if entry_size > self.limits.max_individual_file_size {
            return Err(Error::IndividualFileTooLarge {
                size: entry_size,
                limit: self.limits.max_individual_file_size,
            });
        }

        let total = self.total_bytes_written.saturating_add(entry_size);
        if total > self.limits.max_extracted_size {
            return Err(Error::SizeLimitExceeded {
                attempted: total,
                limit: self.limits.max_extracted_size,
            });
        }

        if self.original_compressed_size > 0 {
            let allowed = self
                .original_compressed_size
                .saturating_mul(self.limits.max_compression_ratio);
            if total > allowed {
                return Err(Error::CompressionRatioExceeded {
                    extracted: total,
                    compressed: self.original_compressed_size,
                    ratio: self.limits.max_compression_ratio,
                });
            }
        }

        self.file_count = file_count;
        self.total_bytes_written = total;
        Ok(())
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    pub fn original_compressed_size(&self) -> u64 {
        self.original_compressed_size
    }

    pub fn limits(&self) -> &ExtractLimits {
        &self.limits
    }
}
