use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

static APPENDED_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);

pub fn library_search_var() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Returns `existing` with `dir` appended, unless `dir` is already listed.
pub fn joined_search_path(existing: Option<&OsStr>, dir: &Path) -> Result<OsString> {
    let mut entries: Vec<PathBuf> = existing
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();
    entries.retain(|entry| !entry.as_os_str().is_empty());
    if !entries.iter().any(|entry| entry == dir) {
        entries.push(dir.to_path_buf());
    }
    std::env::join_paths(entries)
        .with_context(|| format!("cannot add {} to the library search path", dir.display()))
}

/// Appends the payload's companion library directory to the process search
/// path. Only the first call per process changes the environment; it
/// returns `true` when it did.
pub fn append_library_search_path(dir: &Path) -> Result<bool> {
    let mut appended = APPENDED_DIR.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = appended.as_ref() {
        tracing::debug!(
            previous = %previous.display(),
            requested = %dir.display(),
            "library search path already extended"
        );
        return Ok(false);
    }

    let var = library_search_var();
    let joined = joined_search_path(std::env::var_os(var).as_deref(), dir)?;
    std::env::set_var(var, &joined);
    *appended = Some(dir.to_path_buf());
    tracing::info!(var, dir = %dir.display(), "extended library search path");
    Ok(true)
}

/// Directory added by [`append_library_search_path`], if any.
pub fn appended_search_dir() -> Option<PathBuf> {
    APPENDED_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
