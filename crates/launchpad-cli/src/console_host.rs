//! Minimal host used by `launchpad launch` outside a real host application.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use launchpad_core::{HostVersion, InstalledPayload};
use launchpad_resolver::RestartNotifier;
use launchpad_runtime::{
    ElementId, HostApplication, HostDocument, HostUi, Instrumentation, StabilityTracker, UiEvent,
};

use crate::render::TerminalRenderer;

pub(crate) const CONSOLE_DOCUMENT_TITLE: &str = "console";

pub(crate) struct ConsoleApplication {
    host: HostVersion,
    resolver_dir: Mutex<Option<PathBuf>>,
}

impl ConsoleApplication {
    pub(crate) fn new(host: HostVersion) -> Self {
        Self {
            host,
            resolver_dir: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn resolver_dir(&self) -> Option<PathBuf> {
        self.resolver_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HostApplication for ConsoleApplication {
    fn host_version(&self) -> String {
        self.host.to_string()
    }

    fn attach_debugger(&self) -> Result<()> {
        tracing::warn!(
            pid = std::process::id(),
            "debug requested; attach a debugger to this process"
        );
        Ok(())
    }

    fn active_document_title(&self) -> Option<String> {
        Some(CONSOLE_DOCUMENT_TITLE.to_string())
    }

    fn register_module_resolver(&self, dir: &Path) -> Result<()> {
        let mut current = self.resolver_dir.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(dir = %dir.display(), "module resolver registered");
        *current = Some(dir.to_path_buf());
        Ok(())
    }

    fn unregister_module_resolver(&self) {
        let mut current = self.resolver_dir.lock().unwrap_or_else(PoisonError::into_inner);
        if current.take().is_some() {
            tracing::debug!("module resolver unregistered");
        }
    }
}

/// Document with no content; enforces one open transaction at a time.
#[derive(Debug, Default)]
pub(crate) struct ConsoleDocument {
    open_transaction: Option<String>,
}

impl ConsoleDocument {
    fn close(&mut self, name: &str, action: &str) -> Result<()> {
        match self.open_transaction.as_deref() {
            Some(open) if open == name => {
                self.open_transaction = None;
                tracing::debug!(transaction = name, action, "console transaction closed");
                Ok(())
            }
            Some(open) => bail!("cannot {action} '{name}': transaction '{open}' is open"),
            None => bail!("cannot {action} '{name}': no transaction is open"),
        }
    }
}

impl HostDocument for ConsoleDocument {
    fn title(&self) -> String {
        CONSOLE_DOCUMENT_TITLE.to_string()
    }

    fn start_transaction(&mut self, name: &str) -> Result<()> {
        if let Some(open) = &self.open_transaction {
            bail!("cannot start '{name}': transaction '{open}' is still open");
        }
        self.open_transaction = Some(name.to_string());
        Ok(())
    }

    fn commit_transaction(&mut self, name: &str) -> Result<()> {
        self.close(name, "commit")
    }

    fn rollback_transaction(&mut self, name: &str) -> Result<()> {
        self.close(name, "roll back")
    }

    fn delete_element(&mut self, id: ElementId) -> Result<()> {
        if self.open_transaction.is_none() {
            bail!("deleting element {id} requires an open transaction");
        }
        tracing::info!(element = %id, "console document deleted element");
        Ok(())
    }
}

/// Host UI for the console: messages become status lines, the rest is logged.
#[derive(Clone, Copy)]
pub(crate) struct ConsoleUi {
    renderer: TerminalRenderer,
}

impl ConsoleUi {
    pub(crate) fn new(renderer: TerminalRenderer) -> Self {
        Self { renderer }
    }
}

impl HostUi for ConsoleUi {
    fn show_message(&self, title: &str, message: &str) {
        self.renderer.eprint_status("err", &format!("{title}: {message}"));
    }

    fn show_crash_prompt(&self, details: &str) -> Result<()> {
        self.renderer
            .eprint_status("err", &format!("payload crashed: {details}"));
        Ok(())
    }

    fn set_command_enabled(&self, enabled: bool) {
        tracing::debug!(enabled, "launch command availability changed");
    }

    fn subscribe(&self, event: UiEvent) {
        tracing::debug!(event = ?event, "ui hook attached");
    }

    fn unsubscribe(&self, event: UiEvent) {
        tracing::debug!(event = ?event, "ui hook detached");
    }
}

/// Reports failures to the log only; the console has no telemetry backend.
#[derive(Debug, Default)]
pub(crate) struct ConsoleReporting;

impl Instrumentation for ConsoleReporting {
    fn log_event(&self, name: &str, detail: &str) {
        tracing::info!(event = name, detail, "payload event");
    }

    fn log_exception(&self, detail: &str) -> Result<()> {
        tracing::error!(detail, "payload exception");
        Ok(())
    }
}

impl StabilityTracker for ConsoleReporting {
    fn report_startup_failure(&self, detail: &str) -> Result<()> {
        tracing::warn!(detail, "payload startup failure recorded");
        Ok(())
    }

    fn report_crash(&self, detail: &str) -> Result<()> {
        tracing::warn!(detail, "payload crash recorded");
        Ok(())
    }
}

pub(crate) struct ConsoleRestartNotifier {
    renderer: TerminalRenderer,
}

impl ConsoleRestartNotifier {
    pub(crate) fn new(renderer: TerminalRenderer) -> Self {
        Self { renderer }
    }
}

impl RestartNotifier for ConsoleRestartNotifier {
    fn restart_required(&self, host: &HostVersion, selected: &InstalledPayload) {
        self.renderer.print_status(
            "warn",
            &format!(
                "restart host {host} to load {} {}",
                selected.name,
                selected.version.display_label()
            ),
        );
    }
}
