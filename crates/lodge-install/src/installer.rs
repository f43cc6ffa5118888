//! Install orchestration.
//!
//! Each step registers its inverse with a [`Transaction`] as soon as it
//! succeeds; any later failure unwinds everything done so far.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lodge_archive::{ArchiveFormat, ExtractOptions};
use lodge_fs::{AtomicWriteOptions, PermissionMode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::effects::{
    DesktopEntry, DesktopIntegration, PackageConverter, PackageManager, exec_arg,
};
use crate::error::InstallError;
use crate::select::{choose_best, find_candidates};
use crate::transaction::Transaction;

pub(crate) fn user_data_dir() -> Option<PathBuf> {
    env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|h| h.join(".local/share")))
}

/// Where applications and their launcher scripts go.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InstallLayout {
    pub apps_dir: PathBuf,
    pub bin_dir: PathBuf,
}

impl InstallLayout {
    /// `<root>/apps` and `<root>/bin`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            apps_dir: root.join("apps"),
            bin_dir: root.join("bin"),
        }
    }

    /// `$XDG_DATA_HOME/lodge/apps` and `~/.local/bin`.
    pub fn user() -> Option<Self> {
        let home = home::home_dir()?;
        let data = user_data_dir()?;
        Some(Self {
            apps_dir: data.join("lodge/apps"),
            bin_dir: home.join(".local/bin"),
        })
    }

    /// Resolve relative directories against the current working directory.
    pub fn absolute(&self) -> io::Result<Self> {
        Ok(Self {
            apps_dir: std::path::absolute(&self.apps_dir)?,
            bin_dir: std::path::absolute(&self.bin_dir)?,
        })
    }
}

/// Result of a successful archive install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallReceipt {
    pub app_id: String,
    pub install_dir: PathBuf,
    pub executable: PathBuf,
    pub wrapper: PathBuf,
    pub icons: Vec<PathBuf>,
    pub desktop_entry: Option<PathBuf>,
}

/// Result of a successful package install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageReceipt {
    pub package: String,
    pub desktop_entry: Option<PathBuf>,
}

/// Derive a filesystem-safe identifier: lowercase, non-alphanumeric runs
/// collapsed to `-`.
pub fn app_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            id.push(c);
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    id
}

fn wrapper_script(executable: &Path) -> String {
    let mut quoted = String::new();
    for c in executable.to_string_lossy().chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    format!("#!/bin/sh\nexec \"{quoted}\" \"$@\"\n")
}

pub struct Installer {
    layout: InstallLayout,
    extract_options: ExtractOptions,
    action_timeout: Option<Duration>,
    desktop: Option<Arc<dyn DesktopIntegration>>,
    packages: Option<Arc<dyn PackageManager>>,
    converter: Option<Arc<dyn PackageConverter>>,
}

impl Installer {
    pub fn new(layout: InstallLayout) -> Self {
        Self {
            layout,
            extract_options: ExtractOptions::default(),
            action_timeout: None,
            desktop: None,
            packages: None,
            converter: None,
        }
    }

    pub fn extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    /// Bound each compensating action during rollback.
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    pub fn desktop(mut self, desktop: Arc<dyn DesktopIntegration>) -> Self {
        self.desktop = Some(desktop);
        self
    }

    pub fn package_manager(mut self, packages: Arc<dyn PackageManager>) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn PackageConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn transaction(&self) -> Transaction {
        match self.action_timeout {
            Some(timeout) => Transaction::new().with_action_timeout(timeout),
            None => Transaction::new(),
        }
    }

    /// Extract a portable application archive and hook it into the desktop.
    #[instrument(skip(self), err)]
    pub fn install_archive(&self, archive: &Path, name: &str) -> Result<InstallReceipt, InstallError> {
        let tx = self.transaction();
        match self.archive_steps(&tx, archive, name) {
            Ok(receipt) => {
                tx.commit();
                info!(app = %receipt.app_id, exe = %receipt.executable.display(), "installed");
                Ok(receipt)
            }
            Err(err) => Err(unwind(&tx, err)),
        }
    }

    fn archive_steps(
        &self,
        tx: &Transaction,
        archive: &Path,
        name: &str,
    ) -> Result<InstallReceipt, InstallError> {
        let app_id = app_id(name);
        if app_id.is_empty() {
            return Err(InstallError::InvalidName(name.to_string()));
        }

        let layout = self.layout.absolute()?;
        let install_dir = layout.apps_dir.join(&app_id);
        fs::create_dir_all(&layout.apps_dir)?;
        match fs::create_dir(&install_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(InstallError::AlreadyInstalled {
                    app_id,
                    path: install_dir,
                });
            }
            Err(e) => return Err(e.into()),
        }
        let dir = install_dir.clone();
        tx.add("remove install directory", move || {
            lodge_fs::remove_path(&dir)?;
            Ok(())
        });

        let format = lodge_archive::detect_archive(archive)?;
        debug!(%format, dest = %install_dir.display(), "extracting");
        lodge_archive::extract(format, archive, &install_dir, &self.extract_options)?;

        let candidates = find_candidates(&install_dir)?;
        let base_name = ArchiveFormat::stem(archive).unwrap_or_else(|| name.to_string());
        let executable = choose_best(&candidates, &base_name, &install_dir)
            .ok_or_else(|| InstallError::NoExecutableCandidates(install_dir.clone()))?;
        debug!(exe = %executable.display(), candidates = candidates.len(), "selected executable");

        let wrapper = layout.bin_dir.join(&app_id);
        if fs::symlink_metadata(&wrapper).is_ok() {
            return Err(InstallError::AlreadyInstalled {
                app_id,
                path: wrapper,
            });
        }
        fs::create_dir_all(&layout.bin_dir)?;
        lodge_fs::atomic_write(
            &wrapper,
            wrapper_script(&executable).as_bytes(),
            AtomicWriteOptions::new()
                .permissions(PermissionMode::Executable)
                .sync(true),
        )?;
        let script = wrapper.clone();
        tx.add("remove wrapper script", move || {
            lodge_fs::remove_path(&script)?;
            Ok(())
        });

        let mut icons = Vec::new();
        let mut desktop_entry = None;
        if let Some(desktop) = &self.desktop {
            icons = desktop
                .install_icons(&install_dir, &app_id)
                .map_err(InstallError::collaborator("install icons"))?;
            for icon in &icons {
                let icon = icon.clone();
                tx.add(format!("remove icon {}", icon.display()), move || {
                    lodge_fs::remove_path(&icon)?;
                    Ok(())
                });
            }

            let mut entry = DesktopEntry::new(&app_id, name, exec_arg(&wrapper.to_string_lossy()));
            entry.icon = icons.first().map(|p| p.to_string_lossy().into_owned());
            let path = desktop
                .write_entry(&entry)
                .map_err(InstallError::collaborator("write desktop entry"))?;
            let file = path.clone();
            tx.add("remove desktop entry", move || {
                lodge_fs::remove_path(&file)?;
                Ok(())
            });
            desktop_entry = Some(path);
        }

        Ok(InstallReceipt {
            app_id,
            install_dir,
            executable,
            wrapper,
            icons,
            desktop_entry,
        })
    }

    /// Install a native package, converting it first when a converter is
    /// configured.
    #[instrument(skip(self, entry), err)]
    pub fn install_package(
        &self,
        artifact: &Path,
        entry: Option<&DesktopEntry>,
    ) -> Result<PackageReceipt, InstallError> {
        let tx = self.transaction();
        match self.package_steps(&tx, artifact, entry) {
            Ok(receipt) => {
                tx.commit();
                info!(package = %receipt.package, "installed");
                Ok(receipt)
            }
            Err(err) => Err(unwind(&tx, err)),
        }
    }

    fn package_steps(
        &self,
        tx: &Transaction,
        artifact: &Path,
        entry: Option<&DesktopEntry>,
    ) -> Result<PackageReceipt, InstallError> {
        let packages = self
            .packages
            .clone()
            .ok_or(InstallError::Unconfigured("package manager"))?;

        // Keeps the converted file alive until the package manager is done.
        let mut scratch = None;
        let package_file = match &self.converter {
            Some(converter) => {
                let dir = tempfile::tempdir()?;
                let converted = converter
                    .convert(artifact, dir.path())
                    .map_err(InstallError::collaborator("convert package"))?;
                scratch = Some(dir);
                converted
            }
            None => artifact.to_path_buf(),
        };

        let package = packages
            .install(&package_file)
            .map_err(InstallError::collaborator("install package"))?;
        drop(scratch);
        let name = package.clone();
        tx.add(format!("remove package {package}"), move || packages.remove(&name));

        let mut desktop_entry = None;
        if let Some(entry) = entry {
            let desktop = self
                .desktop
                .as_ref()
                .ok_or(InstallError::Unconfigured("desktop integration"))?;
            let path = desktop
                .write_entry(entry)
                .map_err(InstallError::collaborator("write desktop entry"))?;
            let file = path.clone();
            tx.add("remove desktop entry", move || {
                lodge_fs::remove_path(&file)?;
                Ok(())
            });
            desktop_entry = Some(path);
        }

        Ok(PackageReceipt {
            package,
            desktop_entry,
        })
    }
}

fn unwind(tx: &Transaction, err: InstallError) -> InstallError {
    warn!(error = %err, "install failed, rolling back");
    let rollback = tx.rollback().err();
    if let Some(rollback) = &rollback {
        warn!(error = %rollback, "rollback incomplete");
    }
    InstallError::Failed {
        source: Box::new(err),
        rollback,
    }
}
