//! Reference payload entry module for hosts at or above the legacy threshold.
//!
//! Copy the build output to `{install_root}/Revit_{host}/` next to a
//! `payload.toml` to have `launchpad launch` load it. The entry runs its
//! session through [`SessionSupervisor`] with the services the host puts on
//! the [`StartupContext`].

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use launchpad_runtime::{
    declare_entry_point, CommandResult, EntryPoint, HostServices, PayloadFactory, PayloadModel,
    PayloadServices, SessionContext, SessionSupervisor, StartupContext,
};

pub const LOAD_WORKSPACE_TRANSACTION: &str = "Load workspace";

#[derive(Default)]
pub struct RevitEntry {
    session: RefCell<Option<EntrySession>>,
}

struct EntrySession {
    supervisor: SessionSupervisor<WorkspaceFactory>,
    context: SessionContext,
}

impl EntrySession {
    fn new(services: HostServices, companion_dir: Option<PathBuf>) -> Self {
        let mut supervisor =
            SessionSupervisor::new(WorkspaceFactory, services.collaborators, services.idle);
        if let Some(dir) = companion_dir {
            supervisor = supervisor.with_companion_dir(dir);
        }
        Self {
            supervisor,
            context: SessionContext::new(),
        }
    }
}

impl EntryPoint for RevitEntry {
    fn on_startup(&self, context: &mut StartupContext) -> Result<()> {
        let services = context
            .services
            .clone()
            .context("host did not provide session services")?;
        let mut slot = self.session.borrow_mut();
        let session = slot
            .get_or_insert_with(|| EntrySession::new(services, context.companion_dir.clone()));

        let EntrySession {
            supervisor,
            context: session_context,
        } = session;
        match supervisor.execute_command(session_context, context) {
            CommandResult::Succeeded => {
                let host = context.application.host_version();
                tracing::info!(
                    host = %host,
                    debug = context.debug_requested(),
                    "payload entry started"
                );
                context.message = Some(match context.workspace_path() {
                    Some(path) => format!("payload ready for host {host} with {}", path.display()),
                    None => format!("payload ready for host {host}"),
                });
                Ok(())
            }
            CommandResult::Failed(message) => bail!(message),
        }
    }

    fn on_shutdown(&self, _context: &mut StartupContext) -> Result<()> {
        match self.session.borrow_mut().as_mut() {
            Some(session) => session.supervisor.close_payload(&mut session.context),
            None => Ok(()),
        }
    }
}

declare_entry_point!(RevitEntry);

struct WorkspaceFactory;

impl PayloadFactory for WorkspaceFactory {
    fn create(
        &mut self,
        _startup: &StartupContext,
        services: PayloadServices,
    ) -> Result<Box<dyn PayloadModel>> {
        Ok(Box::new(WorkspaceModel { services }))
    }
}

struct WorkspaceModel {
    services: PayloadServices,
}

impl PayloadModel for WorkspaceModel {
    fn show_ui(&mut self) -> Result<()> {
        tracing::debug!("payload window shown");
        Ok(())
    }

    // Document access waits for the host to go idle.
    fn open_workspace(&mut self, path: &Path) -> Result<()> {
        let workspace = path.to_path_buf();
        self.services.idle.submit(move |scope| {
            let document = scope.document().title();
            scope.transaction(LOAD_WORKSPACE_TRANSACTION, |_document| {
                tracing::info!(
                    document = %document,
                    workspace = %workspace.display(),
                    "workspace loaded"
                );
                Ok(())
            })
        })?;
        Ok(())
    }

    fn shutdown(&mut self, allow_cancellation: bool) -> Result<()> {
        tracing::debug!(allow_cancellation, "payload model shutting down");
        self.services.shutdown_started.shutdown_started()?;
        Ok(())
    }
}
