//! Collaborators the installer drives but does not implement itself.
//!
//! Everything privileged or desktop-specific sits behind these traits so the
//! orchestration can be tested with in-memory fakes.

use std::fs;
use std::path::{Path, PathBuf};

use lodge_fs::{AtomicWriteOptions, PermissionMode};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::BoxError;

/// System package manager (dpkg, rpm, pacman, ...).
pub trait PackageManager: Send + Sync {
    /// Install the package file at `path` and return the installed package
    /// name, which [`remove`](Self::remove) accepts.
    fn install(&self, path: &Path) -> Result<String, BoxError>;

    fn remove(&self, name: &str) -> Result<(), BoxError>;
}

/// Converts a foreign package into one the [`PackageManager`] accepts.
pub trait PackageConverter: Send + Sync {
    /// Write the converted package into `out_dir` and return its path.
    fn convert(&self, artifact: &Path, out_dir: &Path) -> Result<PathBuf, BoxError>;
}

pub trait DesktopIntegration: Send + Sync {
    /// Copy icons found below `source_root` into place, returning every file
    /// written.
    fn install_icons(&self, source_root: &Path, app_id: &str) -> Result<Vec<PathBuf>, BoxError>;

    /// Write a launcher entry and return its path.
    fn write_entry(&self, entry: &DesktopEntry) -> Result<PathBuf, BoxError>;
}

/// Encode one argument for an `Exec=` line.
///
/// Arguments with reserved characters are double-quoted with `"`, `` ` ``,
/// `$` and `\` backslash-escaped, then backslashes are escaped again for the
/// string value. `%` is doubled so it is never read as a field code.
pub fn exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#',
        '(', ')', '`',
    ];

    let arg = arg.replace('%', "%%");
    if !arg.contains(RESERVED) {
        return arg;
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '"' | '`' | '$' => {
                quoted.push_str("\\\\");
                quoted.push(c);
            }
            '\\' => quoted.push_str("\\\\\\\\"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Freedesktop launcher entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesktopEntry {
    pub id: String,
    pub name: String,
    pub exec: String,
    pub icon: Option<String>,
    pub comment: Option<String>,
    pub categories: Vec<String>,
    pub terminal: bool,
}

impl DesktopEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, exec: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            exec: exec.into(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("[Desktop Entry]\nType=Application\n");
        out.push_str(&format!("Name={}\n", self.name));
        out.push_str(&format!("Exec={}\n", self.exec));
        if let Some(icon) = &self.icon {
            out.push_str(&format!("Icon={icon}\n"));
        }
        if let Some(comment) = &self.comment {
            out.push_str(&format!("Comment={comment}\n"));
        }
        if !self.categories.is_empty() {
            out.push_str(&format!("Categories={};\n", self.categories.join(";")));
        }
        out.push_str(&format!("Terminal={}\n", self.terminal));
        out
    }
}

const ICON_EXTENSIONS: &[&str] = &["svg", "png", "xpm"];

/// Writes `.desktop` files and icons into XDG data directories.
#[derive(Clone, Debug)]
pub struct XdgDesktop {
    pub applications_dir: PathBuf,
    pub icons_dir: PathBuf,
}

impl XdgDesktop {
    pub fn new(applications_dir: impl Into<PathBuf>, icons_dir: impl Into<PathBuf>) -> Self {
        Self {
            applications_dir: applications_dir.into(),
            icons_dir: icons_dir.into(),
        }
    }

    /// `$XDG_DATA_HOME/applications` and `$XDG_DATA_HOME/icons/hicolor/...`.
    pub fn user() -> Option<Self> {
        let data = crate::installer::user_data_dir()?;
        Some(Self::new(
            data.join("applications"),
            data.join("icons/hicolor/scalable/apps"),
        ))
    }

    /// Prefer vector icons, then the largest raster file.
    fn pick_icon(source_root: &Path) -> Option<PathBuf> {
        let mut best: Option<(usize, u64, PathBuf)> = None;
        for entry in WalkDir::new(source_root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase());
            let Some(rank) = ext.and_then(|ext| ICON_EXTENSIONS.iter().position(|e| *e == ext))
            else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let better = match &best {
                None => true,
                Some((best_rank, best_size, _)) => {
                    rank < *best_rank || (rank == *best_rank && size > *best_size)
                }
            };
            if better {
                best = Some((rank, size, entry.into_path()));
            }
        }
        best.map(|(_, _, path)| path)
    }
}

impl DesktopIntegration for XdgDesktop {
    fn install_icons(&self, source_root: &Path, app_id: &str) -> Result<Vec<PathBuf>, BoxError> {
        let Some(icon) = Self::pick_icon(source_root) else {
            debug!(root = %source_root.display(), "no icon found");
            return Ok(Vec::new());
        };
        let ext = icon
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        fs::create_dir_all(&self.icons_dir)?;
        let target = self.icons_dir.join(format!("{app_id}.{ext}"));
        let data = lodge_fs::read(&icon)?;
        lodge_fs::atomic_write(&target, &data, AtomicWriteOptions::new())?;
        Ok(vec![target])
    }

    fn write_entry(&self, entry: &DesktopEntry) -> Result<PathBuf, BoxError> {
        fs::create_dir_all(&self.applications_dir)?;
        let target = self.applications_dir.join(format!("{}.desktop", entry.id));
        lodge_fs::atomic_write(
            &target,
            entry.render().as_bytes(),
            AtomicWriteOptions::new()
                .permissions(PermissionMode::ReadWrite)
                .sync(true),
        )?;
        Ok(target)
    }
}
