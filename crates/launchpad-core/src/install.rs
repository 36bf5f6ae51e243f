use std::cmp::Ordering;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

use crate::version::{HostVersion, PayloadVersion};

/// Installations older than this keep their entry module directly under the
/// install root. Real installations depend on this split; do not move it.
pub const LEGACY_ENTRY_THRESHOLD: PayloadVersion = PayloadVersion::new(0, 7, 0, 0);

pub const ENTRY_MODULE_STEM: &str = "launchpad_revit_entry";
pub const LEGACY_ENTRY_MODULE_STEM: &str = "launchpad_legacy_entry";
pub const HOST_SUBDIR_PREFIX: &str = "Revit_";

pub fn entry_module_file_name() -> String {
    format!("{DLL_PREFIX}{ENTRY_MODULE_STEM}{DLL_SUFFIX}")
}

pub fn legacy_entry_module_file_name() -> String {
    format!("{DLL_PREFIX}{LEGACY_ENTRY_MODULE_STEM}{DLL_SUFFIX}")
}

pub fn host_subdir_name(host: &HostVersion) -> String {
    format!("{HOST_SUBDIR_PREFIX}{host}")
}

pub fn resolve_entry_path(
    install_root: &Path,
    version: PayloadVersion,
    host: &HostVersion,
) -> PathBuf {
    if version < LEGACY_ENTRY_THRESHOLD {
        install_root.join(legacy_entry_module_file_name())
    } else {
        install_root
            .join(host_subdir_name(host))
            .join(entry_module_file_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPayload {
    pub install_root: PathBuf,
    pub name: String,
    pub version: PayloadVersion,
}

impl InstalledPayload {
    pub fn new(
        install_root: impl Into<PathBuf>,
        name: impl Into<String>,
        version: PayloadVersion,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            name: name.into(),
            version,
        }
    }

    pub fn entry_path(&self, host: &HostVersion) -> PathBuf {
        resolve_entry_path(&self.install_root, self.version, host)
    }

    /// Directory holding the entry module and the native libraries shipped
    /// next to it.
    pub fn companion_library_dir(&self, host: &HostVersion) -> PathBuf {
        let entry = self.entry_path(host);
        entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.install_root.clone())
    }
}

impl PartialOrd for InstalledPayload {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstalledPayload {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.install_root.cmp(&other.install_root))
            .then_with(|| self.name.cmp(&other.name))
    }
}
