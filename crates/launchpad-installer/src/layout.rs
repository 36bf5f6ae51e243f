use anyhow::{Context, Result};
use launchpad_core::HostVersion;
use std::fs;
use std::path::{Path, PathBuf};

pub const HOME_OVERRIDE_ENV: &str = "LAUNCHPAD_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherLayout {
    prefix: PathBuf,
}

impl LauncherLayout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join("state")
    }

    pub fn selections_dir(&self) -> PathBuf {
        self.state_dir().join("selections")
    }

    pub fn selection_path(&self, host: &HostVersion) -> PathBuf {
        self.selections_dir().join(format!("{host}.selection"))
    }

    /// Install root used when neither a flag nor the config names one.
    pub fn payloads_dir(&self) -> PathBuf {
        self.prefix.join("payloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.prefix.join("logs")
    }

    pub fn config_path(&self) -> PathBuf {
        self.prefix.join("launchpad.toml")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.state_dir(), self.selections_dir(), self.logs_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_user_prefix() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_OVERRIDE_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    if cfg!(windows) {
        let app_data = std::env::var("APPDATA")
            .context("APPDATA is not set; cannot resolve Windows user prefix")?;
        return Ok(PathBuf::from(app_data).join("Launchpad"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".launchpad"))
}
