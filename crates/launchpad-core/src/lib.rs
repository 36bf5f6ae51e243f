mod error;
mod install;
mod manifest;
mod version;

pub use error::{launch_error, LaunchError};
pub use install::{
    entry_module_file_name, host_subdir_name, legacy_entry_module_file_name, resolve_entry_path,
    InstalledPayload, ENTRY_MODULE_STEM, HOST_SUBDIR_PREFIX, LEGACY_ENTRY_MODULE_STEM,
    LEGACY_ENTRY_THRESHOLD,
};
pub use manifest::{InstallManifest, INSTALL_MANIFEST_FILE};
pub use version::{HostVersion, PayloadVersion};
