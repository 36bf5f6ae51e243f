//! Named failure conditions of the bootstrap.
//!
//! Library code propagates these wrapped in `anyhow::Error`; callers that
//! need to branch on a condition use `downcast_ref::<LaunchError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("payload detection unavailable at {}: {reason}", base.display())]
    DetectionUnavailable { base: PathBuf, reason: String },
    #[error("no payload available for host {host}")]
    NoPayloadAvailable { host: String },
    #[error("selection index {index} is out of range for {len} installed payload(s)")]
    SelectionOutOfRange { index: usize, len: usize },
    #[error("entry point not found: {}", path.display())]
    EntryPointNotFound { path: PathBuf },
    #[error("incompatible payload version at {}: {detail}", path.display())]
    IncompatiblePayload { path: PathBuf, detail: String },
}

/// Returns the named condition carried by `err`, if any.
pub fn launch_error(err: &anyhow::Error) -> Option<&LaunchError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LaunchError>())
}
