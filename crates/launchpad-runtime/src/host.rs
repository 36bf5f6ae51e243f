//! Narrow interfaces to the host application and the collaborators the
//! session reports to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::session::HostServices;

pub const JOURNAL_DEBUG_KEY: &str = "debug";
pub const JOURNAL_WORKSPACE_KEY: &str = "workspace_path";

/// Opaque identifier of a host-managed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub i64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait HostApplication: Send + Sync {
    fn host_version(&self) -> String;

    fn attach_debugger(&self) -> Result<()>;

    fn active_document_title(&self) -> Option<String>;

    /// Lets the loader find modules shipped in `dir`.
    fn register_module_resolver(&self, dir: &Path) -> Result<()>;

    fn unregister_module_resolver(&self);
}

/// Host document. Only touched from the idle context.
pub trait HostDocument {
    fn title(&self) -> String;

    fn start_transaction(&mut self, name: &str) -> Result<()>;

    fn commit_transaction(&mut self, name: &str) -> Result<()>;

    fn rollback_transaction(&mut self, name: &str) -> Result<()>;

    fn delete_element(&mut self, id: ElementId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiEvent {
    UnhandledFault,
    Closed,
}

pub trait HostUi {
    fn show_message(&self, title: &str, message: &str);

    fn show_crash_prompt(&self, details: &str) -> Result<()>;

    /// Enables or disables the host control that launches the payload.
    fn set_command_enabled(&self, enabled: bool);

    fn subscribe(&self, event: UiEvent);

    fn unsubscribe(&self, event: UiEvent);
}

pub trait Instrumentation {
    fn log_event(&self, name: &str, detail: &str);

    fn log_exception(&self, detail: &str) -> Result<()>;
}

pub trait StabilityTracker {
    fn report_startup_failure(&self, detail: &str) -> Result<()>;

    fn report_crash(&self, detail: &str) -> Result<()>;
}

/// Last-resort destination for failures raised while reporting another
/// failure.
pub trait FallbackSink {
    fn capture(&self, stage: &str, err: &anyhow::Error);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFallbackSink;

impl FallbackSink for TracingFallbackSink {
    fn capture(&self, stage: &str, err: &anyhow::Error) {
        tracing::error!(
            stage,
            error = %format!("{err:#}"),
            "secondary failure while handling a fault"
        );
    }
}

/// Context handed to the payload entry point by the host.
pub struct StartupContext {
    pub journal: BTreeMap<String, String>,
    pub application: Arc<dyn HostApplication>,
    /// Directory holding the entry module and the libraries shipped with it.
    pub companion_dir: Option<PathBuf>,
    pub services: Option<HostServices>,
    /// Message reported back to the host when a command fails.
    pub message: Option<String>,
}

impl StartupContext {
    pub fn new(application: Arc<dyn HostApplication>) -> Self {
        Self {
            journal: BTreeMap::new(),
            application,
            companion_dir: None,
            services: None,
            message: None,
        }
    }

    pub fn with_journal(mut self, journal: BTreeMap<String, String>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_companion_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.companion_dir = Some(dir.into());
        self
    }

    pub fn with_services(mut self, services: HostServices) -> Self {
        self.services = Some(services);
        self
    }

    pub fn debug_requested(&self) -> bool {
        self.journal
            .get(JOURNAL_DEBUG_KEY)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.journal
            .get(JOURNAL_WORKSPACE_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }
}

impl fmt::Debug for StartupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupContext")
            .field("journal", &self.journal)
            .field("host_version", &self.application.host_version())
            .field("companion_dir", &self.companion_dir)
            .field("services", &self.services.is_some())
            .field("message", &self.message)
            .finish()
    }
}
