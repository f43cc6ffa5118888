use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompress),
}

/// Compression codec wrapped around a tar stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TarCompress {
    None,
    Gzip,
    Xz,
    Bzip2,
}

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

/// Suffixes recognised by [`ArchiveFormat::from_path`], matched case-insensitively.
const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::Tar(TarCompress::Gzip)),
    (".tgz", ArchiveFormat::Tar(TarCompress::Gzip)),
    (".tar.xz", ArchiveFormat::Tar(TarCompress::Xz)),
    (".txz", ArchiveFormat::Tar(TarCompress::Xz)),
    (".tar.bz2", ArchiveFormat::Tar(TarCompress::Bzip2)),
    (".tbz2", ArchiveFormat::Tar(TarCompress::Bzip2)),
    (".tbz", ArchiveFormat::Tar(TarCompress::Bzip2)),
    (".tar", ArchiveFormat::Tar(TarCompress::None)),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Guess the format from the file name alone.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// File name with the archive suffix removed, e.g. `tool-1.2-linux` for
    /// `tool-1.2-linux.tar.gz`.
    pub fn stem(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let lower = name.to_ascii_lowercase();
        let stem = SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(suffix, _)| &name[..name.len() - suffix.len()])
            .unwrap_or(&name);
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::Tar(TarCompress::None) => f.write_str("tar"),
            Self::Tar(TarCompress::Gzip) => f.write_str("tar.gz"),
            Self::Tar(TarCompress::Xz) => f.write_str("tar.xz"),
            Self::Tar(TarCompress::Bzip2) => f.write_str("tar.bz2"),
        }
    }
}

impl TarCompress {
    pub fn decoder<R: Read>(self, reader: R) -> Decoder<R> {
        match self {
            Self::None => Decoder::Passthrough(reader),
            Self::Gzip => Decoder::Gzip(Box::new(flate2::read::GzDecoder::new(reader))),
            Self::Xz => Decoder::Xz(Box::new(xz2::read::XzDecoder::new(reader))),
            Self::Bzip2 => Decoder::Bzip2(Box::new(bzip2::read::BzDecoder::new(reader))),
        }
    }
}

/// Decompression front-end for tar streams.
pub enum Decoder<R: Read> {
    Passthrough(R),
    Gzip(Box<flate2::read::GzDecoder<R>>),
    Xz(Box<xz2::read::XzDecoder<R>>),
    Bzip2(Box<bzip2::read::BzDecoder<R>>),
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Passthrough(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Xz(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
        }
    }
}

/// Detect the container format from the leading bytes of a file.
pub fn detect_format(data: &[u8]) -> Option<ArchiveFormat> {
    if data.starts_with(&ZIP_MAGIC) || data.starts_with(&ZIP_EMPTY_MAGIC) {
        Some(ArchiveFormat::Zip)
    } else if data.starts_with(&GZIP_MAGIC) {
        Some(ArchiveFormat::Tar(TarCompress::Gzip))
    } else if data.starts_with(&XZ_MAGIC) {
        Some(ArchiveFormat::Tar(TarCompress::Xz))
    } else if data.starts_with(&BZIP2_MAGIC) {
        Some(ArchiveFormat::Tar(TarCompress::Bzip2))
    } else if is_tar_header(data) {
        Some(ArchiveFormat::Tar(TarCompress::None))
    } else {
        None
    }
}

fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= 263 && &data[257..262] == b"ustar"
}

/// Detect by magic number, falling back to the file extension.
pub fn detect_archive(path: &Path) -> Result<ArchiveFormat> {
    let mut header = Vec::with_capacity(512);
    File::open(path)
        .and_then(|f| f.take(512).read_to_end(&mut header))
        .map_err(|e| Error::ExtractionFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    detect_format(&header)
        .or_else(|| ArchiveFormat::from_path(path))
        .ok_or(Error::UnsupportedFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detect_zip_format() {
        let zip_header = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];
        assert_eq!(detect_format(&zip_header), Some(ArchiveFormat::Zip));
    }

    #[test]
    fn detect_tar_gz_format() {
        let gz_header = [0x1F, 0x8B, 0x08, 0x00];
        assert_eq!(
            detect_format(&gz_header),
            Some(ArchiveFormat::Tar(TarCompress::Gzip))
        );
    }

    #[test]
    fn detect_tar_xz_format() {
        let xz_header = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x00];
        assert_eq!(
            detect_format(&xz_header),
            Some(ArchiveFormat::Tar(TarCompress::Xz))
        );
    }

    #[test]
    fn detect_tar_bz2_format() {
        assert_eq!(
            detect_format(b"BZh91AY&SY"),
            Some(ArchiveFormat::Tar(TarCompress::Bzip2))
        );
    }

    #[test]
    fn detect_tar_plain_format() {
        let mut tar_header = [0u8; 512];
        tar_header[257..263].copy_from_slice(b"ustar\0");
        assert_eq!(
            detect_format(&tar_header),
            Some(ArchiveFormat::Tar(TarCompress::None))
        );
    }

    #[test]
    fn detect_unknown_format() {
        let random_data = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(detect_format(&random_data), None);
        assert_eq!(detect_format(&[0u8; 256]), None);
    }

    #[test]
    fn format_from_extension() {
        let cases = [
            ("App-1.0.tar.gz", ArchiveFormat::Tar(TarCompress::Gzip)),
            ("app.TGZ", ArchiveFormat::Tar(TarCompress::Gzip)),
            ("app.tar.xz", ArchiveFormat::Tar(TarCompress::Xz)),
            ("app.tar.bz2", ArchiveFormat::Tar(TarCompress::Bzip2)),
            ("app.tbz", ArchiveFormat::Tar(TarCompress::Bzip2)),
            ("app.tar", ArchiveFormat::Tar(TarCompress::None)),
            ("app.zip", ArchiveFormat::Zip),
        ];
        for (name, expected) in cases {
            assert_eq!(ArchiveFormat::from_path(Path::new(name)), Some(expected), "{name}");
        }
        assert_eq!(ArchiveFormat::from_path(Path::new("app.deb")), None);
    }

    #[test]
    fn stem_strips_archive_suffix() {
        assert_eq!(
            ArchiveFormat::stem(Path::new("/dl/Tool-1.2-linux-x86_64.tar.gz")).as_deref(),
            Some("Tool-1.2-linux-x86_64")
        );
        assert_eq!(ArchiveFormat::stem(Path::new("game.zip")).as_deref(), Some("game"));
        assert_eq!(ArchiveFormat::stem(Path::new("README")).as_deref(), Some("README"));
    }

    #[test]
    fn display_names() {
        assert_eq!(ArchiveFormat::Zip.to_string(), "zip");
        assert_eq!(ArchiveFormat::Tar(TarCompress::Bzip2).to_string(), "tar.bz2");
    }

    #[test]
    fn passthrough_decoder_reads_input() {
        let mut decoder = TarCompress::None.decoder(Cursor::new(b"hello".to_vec()));
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn detect_archive_prefers_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misnamed.zip");
        std::fs::write(&path, [0x1F, 0x8B, 0x08, 0x00]).unwrap();
        assert_eq!(
            detect_archive(&path).unwrap(),
            ArchiveFormat::Tar(TarCompress::Gzip)
        );

        let unknown = dir.path().join("notes.txt");
        std::fs::write(&unknown, b"plain text").unwrap();
        assert!(matches!(detect_archive(&unknown), Err(Error::UnsupportedFormat)));
    }
}
