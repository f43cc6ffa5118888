use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::variants::name_variants;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

const MAX_DEPTH_BONUS: i32 = 11;
const DEEP_PATH: usize = 10;
const DEEP_PATH_PENALTY: i32 = -50;
const EXACT_NAME: i32 = 120;
const PARTIAL_NAME: i32 = 60;
const PARTIAL_MIN_LEN: usize = 3;
const LAUNCHER: i32 = 80;
const HELPER: i32 = -200;
const LIB_PREFIX: i32 = -80;
const SHARED_LIBRARY: i32 = -400;
const BIN_DIR: i32 = 20;
const BUILD_WRAPPER: i32 = -300;
const BUILD_WRAPPER_MAX_SIZE: u64 = 10 * KIB;
const SNIFF_LEN: u64 = KIB;

static LAUNCHER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:wine|wine64|run|start|launch|main|app|game|application)(?:\.exe|\.sh)?$")
        .unwrap()
});

static SHARED_LIBRARY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\.so(?:\.[0-9]+)*|\.dylib|\.dll)$").unwrap());

/// Substrings marking bundled helpers rather than the application itself.
const HELPER_TOKENS: &[&str] = &[
    "sandbox",
    "crash",
    "minidump",
    "updater",
    "uninstall",
    "daemon",
    "installer",
    "debugger",
    "helper",
    "reporter",
    "launcher-helper",
    "elevate",
    "addr2line",
    "objdump",
    "readelf",
    "patchelf",
    "ldconfig",
    "cmake",
    "pkg-config",
];

/// Path fragments leaked into wrapper scripts generated on CI or packaging hosts.
const BUILD_PATH_FRAGMENTS: &[&str] = &[
    "/home/runner/",
    "/github/workspace",
    "/__w/",
    "/builds/",
    "/buildbot/",
    "/var/lib/jenkins",
    "/opt/hostedtoolcache",
    "/tmp/build",
    "/build/source",
    "/workspace/build",
];

/// An executable file found below an install root.
#[derive(Clone, Debug)]
pub struct ExecutableCandidate {
    path: PathBuf,
    relative: PathBuf,
}

impl ExecutableCandidate {
    /// `path` may be absolute or relative to `install_root`.
    pub fn new(path: &Path, install_root: &Path) -> Self {
        let (path, relative) = match path.strip_prefix(install_root) {
            Ok(relative) => (path.to_path_buf(), relative.to_path_buf()),
            Err(_) if path.is_relative() => (install_root.join(path), path.to_path_buf()),
            Err(_) => (path.to_path_buf(), path.to_path_buf()),
        };
        Self { path, relative }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn depth(&self) -> usize {
        self.relative
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }

    /// Lowercased file name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    pub fn size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn in_bin_dir(&self) -> bool {
        self.relative
            .parent()
            .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == "bin"))
    }

    /// A small shell script that still points into the machine it was built
    /// on.
    pub fn is_build_wrapper(&self) -> bool {
        if !self.size().is_some_and(|s| s <= BUILD_WRAPPER_MAX_SIZE) {
            return false;
        }
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        let read = File::open(&self.path).and_then(|f| f.take(SNIFF_LEN).read_to_end(&mut head));
        if read.is_err() || !head.starts_with(b"#!") {
            return false;
        }
        let head = String::from_utf8_lossy(&head);
        BUILD_PATH_FRAGMENTS.iter().any(|frag| head.contains(frag))
    }
}

/// Heuristic score of how likely `path` is the application's main binary.
/// Higher is better.
pub fn score_executable(path: &Path, base_name: &str, install_root: &Path) -> i32 {
    let candidate = ExecutableCandidate::new(path, install_root);
    score_candidate(&candidate, &name_variants(base_name))
}

pub(crate) fn score_candidate(candidate: &ExecutableCandidate, variants: &[String]) -> i32 {
    let name = candidate.file_name();
    let mut score = 0;

    let depth = candidate.depth();
    score += (MAX_DEPTH_BONUS - depth as i32) * 10;
    if depth > DEEP_PATH {
        score += DEEP_PATH_PENALTY;
    }

    let stem = name.strip_suffix(".exe").unwrap_or(&name);
    for variant in variants {
        if stem == variant {
            score += EXACT_NAME;
            break;
        }
    }
    for variant in variants {
        if variant.len() >= PARTIAL_MIN_LEN && name.contains(variant.as_str()) {
            score += PARTIAL_NAME;
            break;
        }
    }

    if LAUNCHER_NAME.is_match(&name) {
        score += LAUNCHER;
    }
    for token in HELPER_TOKENS {
        if name.contains(token) {
            score += HELPER;
        }
    }
    if name.starts_with("lib") {
        score += LIB_PREFIX;
    }
    if SHARED_LIBRARY_NAME.is_match(&name) {
        score += SHARED_LIBRARY;
    }

    if let Some(size) = candidate.size() {
        score += match size {
            s if s > 10 * MIB => 30,
            s if s >= MIB => 10,
            s if s < KIB => -70,
            s if s < 100 * KIB => -20,
            _ => 0,
        };
    }

    if candidate.in_bin_dir() {
        score += BIN_DIR;
    }
    if candidate.is_build_wrapper() {
        score += BUILD_WRAPPER;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(name: &str) -> Vec<String> {
        name_variants(name)
    }

    fn score(rel: &str, base: &str) -> i32 {
        score_candidate(
            &ExecutableCandidate::new(Path::new(rel), Path::new("/nonexistent-root")),
            &variants(base),
        )
    }

    #[test]
    fn relative_and_absolute_agree() {
        let root = Path::new("/opt/app");
        assert_eq!(
            score_executable(Path::new("bin/app"), "app", root),
            score_executable(Path::new("/opt/app/bin/app"), "app", root),
        );
    }

    #[test]
    fn depth_bonus() {
        // Unstat-able files contribute no size signal.
        assert_eq!(score("a/b/zzz", "other"), (11 - 3) * 10);
        let deep = "a/b/c/d/e/f/g/h/i/j/zzz";
        assert_eq!(score(deep, "other"), (11 - 11) * 10 - 50);
    }

    #[test]
    fn exact_and_partial_name() {
        let base = score("zzz", "other");
        assert_eq!(score("tool", "tool-1.0") - base, 120 + 60);
        assert_eq!(score("tool.exe", "tool") - base, 120 + 60);
        assert_eq!(score("tool-cli", "tool") - base, 60);
        // Short variants count for exact matches only.
        assert_eq!(score("ab", "ab") - base, 120);
        assert_eq!(score("abc", "ab") - base, 0);
    }

    #[test]
    fn launcher_and_helper_signals() {
        let base = score("zzz", "other");
        assert_eq!(score("start.sh", "other") - base, 80);
        assert_eq!(score("chrome-sandbox", "other") - base, -200);
        assert_eq!(score("crash-reporter", "other") - base, -400);
    }

    #[test]
    fn library_signals() {
        let base = score("zzz", "other");
        assert_eq!(score("libfoo.so.1", "other") - base, -80 - 400);
        assert_eq!(score("plugin.dylib", "other") - base, -400);
        assert_eq!(score("foo.dll", "other") - base, -400);
        assert_eq!(score("sonic", "other") - base, 0);
    }

    #[test]
    fn bin_segment() {
        assert_eq!(score("bin/zzz", "other") - score("etc/zzz", "other"), 20);
        assert_eq!(score("binary", "other"), score("zzz", "other"));
    }

    #[test]
    fn size_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, len: usize| {
            fs::write(dir.path().join(name), vec![0u8; len]).unwrap();
            score_candidate(
                &ExecutableCandidate::new(Path::new(name), dir.path()),
                &variants("other"),
            )
        };
        let base = (11 - 1) * 10;
        assert_eq!(write("tiny", 10), base - 70);
        assert_eq!(write("small", 50 * 1024), base - 20);
        assert_eq!(write("medium", 500 * 1024), base);
        assert_eq!(write("large", 2 * 1024 * 1024), base + 10);
    }

    #[test]
    fn build_wrapper_detection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app"),
            b"#!/bin/sh\nexec /home/runner/work/app/target/release/app \"$@\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("plain"), b"#!/bin/sh\nexec ./app.bin \"$@\"\n").unwrap();

        assert!(ExecutableCandidate::new(Path::new("app"), dir.path()).is_build_wrapper());
        assert!(!ExecutableCandidate::new(Path::new("plain"), dir.path()).is_build_wrapper());
        assert!(!ExecutableCandidate::new(Path::new("missing"), dir.path()).is_build_wrapper());
    }
}
