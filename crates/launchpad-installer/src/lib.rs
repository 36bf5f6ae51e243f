mod config;
mod layout;
mod scanner;
mod selection;

pub use config::LaunchConfig;
pub use layout::{default_user_prefix, LauncherLayout, HOME_OVERRIDE_ENV};
pub use scanner::{InstallDetector, InstallScanner, ManifestDetector};
pub use selection::{clear_selection, read_selection, read_valid_selection, write_selection};

#[cfg(test)]
mod tests;
