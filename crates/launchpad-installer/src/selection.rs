use anyhow::{Context, Result};
use launchpad_core::HostVersion;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::LauncherLayout;

/// Writes the raw bytes of `entry` followed by a single `\n`.
pub fn write_selection(
    layout: &LauncherLayout,
    host: &HostVersion,
    entry: &Path,
) -> Result<PathBuf> {
    let selection_path = layout.selection_path(host);
    if let Some(parent) = selection_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create selection dir: {}", parent.display()))?;
    }

    let mut payload = path_to_bytes(entry)?;
    payload.push(b'\n');
    fs::write(&selection_path, &payload)
        .with_context(|| format!("failed to write selection: {}", selection_path.display()))?;
    tracing::debug!(host = %host, entry = %entry.display(), "persisted payload selection");
    Ok(selection_path)
}

/// Reads back exactly what [`write_selection`] wrote. Only the one trailing
/// `\n` is removed; a blank line reads as `None`.
pub fn read_selection(layout: &LauncherLayout, host: &HostVersion) -> Result<Option<PathBuf>> {
    let selection_path = layout.selection_path(host);
    let raw = match fs::read(&selection_path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read selection: {}", selection_path.display())
            });
        }
    };

    let line = raw.strip_suffix(b"\n").unwrap_or(&raw);
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    path_from_bytes(line)
        .map(Some)
        .with_context(|| format!("failed to read selection: {}", selection_path.display()))
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes().to_vec())
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

// Paths that are not valid Unicode are refused rather than stored lossily.
#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Result<Vec<u8>> {
    path.to_str()
        .map(|value| value.as_bytes().to_vec())
        .with_context(|| format!("selection path is not valid Unicode: {}", path.display()))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    let value = std::str::from_utf8(bytes).context("selection file is not valid UTF-8")?;
    Ok(PathBuf::from(value))
}

/// Reads the persisted selection, ignoring it when it no longer names an
/// existing file. An unreadable selection file is treated the same way.
pub fn read_valid_selection(layout: &LauncherLayout, host: &HostVersion) -> Option<PathBuf> {
    let selection = match read_selection(layout, host) {
        Ok(selection) => selection?,
        Err(err) => {
            tracing::warn!(
                host = %host,
                error = %format!("{err:#}"),
                "ignoring unreadable payload selection"
            );
            return None;
        }
    };

    if selection.is_file() {
        Some(selection)
    } else {
        tracing::info!(
            host = %host,
            entry = %selection.display(),
            "persisted payload selection no longer exists"
        );
        None
    }
}

pub fn clear_selection(layout: &LauncherLayout, host: &HostVersion) -> Result<bool> {
    let selection_path = layout.selection_path(host);
    if !selection_path.exists() {
        return Ok(false);
    }

    fs::remove_file(&selection_path)
        .with_context(|| format!("failed to remove selection: {}", selection_path.display()))?;
    Ok(true)
}
