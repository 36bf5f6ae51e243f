use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::version::PayloadVersion;

pub const INSTALL_MANIFEST_FILE: &str = "payload.toml";

/// Descriptor found at the root of every payload installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallManifest {
    pub name: String,
    pub version: PayloadVersion,
}

impl InstallManifest {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let manifest: Self =
            toml::from_str(input).context("failed to parse payload install manifest")?;
        if manifest.name.trim().is_empty() {
            return Err(anyhow!("payload install manifest name must not be empty"));
        }
        Ok(manifest)
    }
}
