use anyhow::{Context, Result};
use launchpad_core::{
    HostVersion, InstallManifest, InstalledPayload, LaunchError, INSTALL_MANIFEST_FILE,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Mechanism that enumerates payload installations beneath a base directory.
pub trait InstallDetector {
    fn detect(&self, base: &Path) -> Result<Vec<InstalledPayload>>;
}

/// Detects installations by reading `payload.toml` in each child directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestDetector;

impl InstallDetector for ManifestDetector {
    fn detect(&self, base: &Path) -> Result<Vec<InstalledPayload>> {
        let entries = fs::read_dir(base).map_err(|err| LaunchError::DetectionUnavailable {
            base: base.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut installs = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read install directory: {}", base.display()))?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let install_root = entry.path();
            let manifest_path = install_root.join(INSTALL_MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }

            let parsed = fs::read_to_string(&manifest_path)
                .with_context(|| format!("failed to read {}", manifest_path.display()))
                .and_then(|raw| InstallManifest::from_toml_str(&raw));
            match parsed {
                Ok(manifest) => {
                    installs.push(InstalledPayload::new(
                        install_root,
                        manifest.name,
                        manifest.version,
                    ));
                }
                Err(err) => {
                    tracing::warn!(
                        manifest = %manifest_path.display(),
                        error = %format!("{err:#}"),
                        "skipping payload installation with invalid manifest"
                    );
                }
            }
        }

        Ok(installs)
    }
}

pub struct InstallScanner<D = ManifestDetector> {
    base: PathBuf,
    detector: D,
}

impl InstallScanner<ManifestDetector> {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_detector(base, ManifestDetector)
    }
}

impl<D: InstallDetector> InstallScanner<D> {
    pub fn with_detector(base: impl Into<PathBuf>, detector: D) -> Self {
        Self {
            base: base.into(),
            detector,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Re-scans on every call. Only installations whose entry module exists
    /// for `host` are returned, sorted most-recent-last.
    pub fn scan(&self, host: &HostVersion) -> Result<Vec<InstalledPayload>> {
        if !self.base.is_dir() {
            return Err(LaunchError::DetectionUnavailable {
                base: self.base.clone(),
                reason: "install root does not exist".to_string(),
            }
            .into());
        }

        let mut installs = self
            .detector
            .detect(&self.base)?
            .into_iter()
            .filter(|install| {
                let entry = install.entry_path(host);
                let present = entry.is_file();
                if !present {
                    tracing::debug!(
                        install_root = %install.install_root.display(),
                        entry = %entry.display(),
                        "installation has no entry module for host"
                    );
                }
                present
            })
            .collect::<Vec<_>>();
        installs.sort();

        tracing::debug!(
            base = %self.base.display(),
            host = %host,
            count = installs.len(),
            "scanned payload installations"
        );
        Ok(installs)
    }
}
