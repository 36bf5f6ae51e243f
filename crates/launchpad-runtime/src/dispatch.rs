use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use launchpad_core::LaunchError;
use libloading::Library;

use crate::host::StartupContext;

pub const ENTRY_ABI_VERSION: u32 = 1;

const ENTRY_ABI_SYMBOL: &[u8] = b"LAUNCHPAD_ENTRY_ABI_VERSION\0";
const ENTRY_CREATE_SYMBOL: &[u8] = b"launchpad_entry_point_create\0";

/// Startup contract every payload entry module implements.
pub trait EntryPoint {
    fn on_startup(&self, context: &mut StartupContext) -> Result<()>;

    /// Called once before the host unloads the module.
    fn on_shutdown(&self, _context: &mut StartupContext) -> Result<()> {
        Ok(())
    }
}

/// Turns an entry module on disk into an [`EntryPoint`].
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn EntryPoint>>;
}

#[derive(Debug, Clone, Copy)]
pub struct DylibLoader {
    abi_version: u32,
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DylibLoader {
    pub fn new() -> Self {
        Self {
            abi_version: ENTRY_ABI_VERSION,
        }
    }

    unsafe fn load_entry(&self, path: &Path, library: Library) -> Result<Box<dyn EntryPoint>> {
        let incompatible = |detail: String| LaunchError::IncompatiblePayload {
            path: path.to_path_buf(),
            detail,
        };

        let version = *library
            .get::<*const u32>(ENTRY_ABI_SYMBOL)
            .map_err(|err| incompatible(format!("missing entry ABI marker: {err}")))?;
        if *version != self.abi_version {
            return Err(incompatible(format!(
                "entry ABI version mismatch: expected {}, actual {}",
                self.abi_version, *version
            ))
            .into());
        }

        let inner = {
            let create = library
                .get::<fn() -> Box<dyn EntryPoint>>(ENTRY_CREATE_SYMBOL)
                .map_err(|err| incompatible(format!("missing entry operation: {err}")))?;
            create()
        };

        Ok(Box::new(DylibEntryPoint {
            inner,
            _library: library,
        }))
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn EntryPoint>> {
        // SAFETY: entry modules are built against this crate with
        // `declare_entry_point!`, which exports exactly the symbols read here.
        unsafe {
            let library = Library::new(path).map_err(|err| LaunchError::IncompatiblePayload {
                path: path.to_path_buf(),
                detail: format!("failed to load entry module: {err}"),
            })?;
            self.load_entry(path, library)
        }
    }
}

// Field order matters: the entry point must drop before its library unloads.
struct DylibEntryPoint {
    inner: Box<dyn EntryPoint>,
    _library: Library,
}

impl EntryPoint for DylibEntryPoint {
    fn on_startup(&self, context: &mut StartupContext) -> Result<()> {
        self.inner.on_startup(context)
    }

    fn on_shutdown(&self, context: &mut StartupContext) -> Result<()> {
        self.inner.on_shutdown(context)
    }
}

/// Payload whose entry operation completed; keeps the module loaded.
pub struct LoadedPayload {
    path: PathBuf,
    entry: Box<dyn EntryPoint>,
}

impl LoadedPayload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shutdown(&self, context: &mut StartupContext) -> Result<()> {
        tracing::info!(entry = %self.path.display(), "shutting payload down");
        self.entry
            .on_shutdown(context)
            .with_context(|| format!("payload shutdown failed: {}", self.path.display()))
    }
}

pub struct Dispatcher<L = DylibLoader> {
    loader: L,
}

impl Default for Dispatcher<DylibLoader> {
    fn default() -> Self {
        Self::new(DylibLoader::new())
    }
}

impl<L: ModuleLoader> Dispatcher<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Loads the entry module and runs its entry operation. Fills in the
    /// context's companion directory from `entry_path` when the caller left
    /// it unset.
    pub fn dispatch(
        &self,
        entry_path: &Path,
        context: &mut StartupContext,
    ) -> Result<LoadedPayload> {
        if !entry_path.is_file() {
            return Err(LaunchError::EntryPointNotFound {
                path: entry_path.to_path_buf(),
            }
            .into());
        }
        if context.companion_dir.is_none() {
            context.companion_dir = entry_path.parent().map(Path::to_path_buf);
        }

        let entry = self.loader.load(entry_path)?;
        tracing::info!(entry = %entry_path.display(), "dispatching payload startup");
        entry
            .on_startup(context)
            .with_context(|| format!("payload startup failed: {}", entry_path.display()))?;

        Ok(LoadedPayload {
            path: entry_path.to_path_buf(),
            entry,
        })
    }
}

/// Exports `$entry_type` (which must implement `Default` and
/// [`EntryPoint`]) from a payload `cdylib`.
#[macro_export]
macro_rules! declare_entry_point {
    ($entry_type:ty) => {
        #[no_mangle]
        pub static LAUNCHPAD_ENTRY_ABI_VERSION: u32 = $crate::ENTRY_ABI_VERSION;

        #[no_mangle]
        pub fn launchpad_entry_point_create() -> Box<dyn $crate::EntryPoint> {
            Box::new(<$entry_type>::default())
        }
    };
}
