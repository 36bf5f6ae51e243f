//! Payload lifecycle inside the host process.
//!
//! A [`SessionContext`] carries the state that lives for the whole host
//! process (one-time initialization, the crash flag, attached hooks) and is
//! passed explicitly to every top-level operation of the
//! [`SessionSupervisor`]. Only the host UI thread calls into the supervisor.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use crate::host::{
    FallbackSink, HostApplication, HostUi, Instrumentation, StabilityTracker, StartupContext,
    UiEvent,
};
use crate::idle::{panic_message, IdleHandle};
use crate::keeper::{KeeperSlot, ShutdownStartedHandler};
use crate::search_path::append_library_search_path;

const STARTUP_FAILED_TITLE: &str = "Payload failed to start";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Starting,
    Running,
    Closed,
}

#[derive(Debug, Default)]
pub struct SessionContext {
    state: SessionState,
    initialized: bool,
    crash_handled: bool,
    fault_hook_attached: bool,
    closed_hook_attached: bool,
    resolution_hook_registered: bool,
    bound_document: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn crash_handled(&self) -> bool {
        self.crash_handled
    }

    pub fn fault_hook_attached(&self) -> bool {
        self.fault_hook_attached
    }

    pub fn closed_hook_attached(&self) -> bool {
        self.closed_hook_attached
    }

    pub fn resolution_hook_registered(&self) -> bool {
        self.resolution_hook_registered
    }

    pub fn bound_document(&self) -> Option<&str> {
        self.bound_document.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Succeeded,
    Failed(String),
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultEvent {
    pub description: String,
    pub handled: bool,
}

impl FaultEvent {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            handled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDisposition {
    /// The fault hook is not attached; the event was left alone.
    NotObserved,
    Handled,
    /// A fault was already handled since the last command started.
    AlreadyHandled,
}

/// Core model plus view model of a running payload.
pub trait PayloadModel {
    fn show_ui(&mut self) -> Result<()>;

    fn open_workspace(&mut self, path: &Path) -> Result<()>;

    fn shutdown(&mut self, allow_cancellation: bool) -> Result<()>;
}

/// Services a payload model receives when it is built.
#[derive(Clone)]
pub struct PayloadServices {
    pub idle: IdleHandle,
    pub keeper: KeeperSlot,
    pub shutdown_started: ShutdownStartedHandler,
}

pub trait PayloadFactory {
    fn create(
        &mut self,
        startup: &StartupContext,
        services: PayloadServices,
    ) -> Result<Box<dyn PayloadModel>>;
}

#[derive(Clone)]
pub struct SessionCollaborators {
    pub ui: Arc<dyn HostUi>,
    pub instrumentation: Arc<dyn Instrumentation>,
    pub stability: Arc<dyn StabilityTracker>,
    pub fallback: Arc<dyn FallbackSink>,
}

/// What the host hands a dynamically loaded entry point so it can run its
/// own [`SessionSupervisor`] against the host's idle context.
#[derive(Clone)]
pub struct HostServices {
    pub idle: IdleHandle,
    pub collaborators: SessionCollaborators,
}

pub struct SessionSupervisor<F> {
    factory: F,
    collaborators: SessionCollaborators,
    idle: IdleHandle,
    keeper: KeeperSlot,
    companion_dir: Option<PathBuf>,
    application: Option<Arc<dyn HostApplication>>,
    shutdown_started: Option<ShutdownStartedHandler>,
    model: Option<Box<dyn PayloadModel>>,
}

impl<F: PayloadFactory> SessionSupervisor<F> {
    pub fn new(factory: F, collaborators: SessionCollaborators, idle: IdleHandle) -> Self {
        Self {
            factory,
            collaborators,
            idle,
            keeper: KeeperSlot::new(),
            companion_dir: None,
            application: None,
            shutdown_started: None,
            model: None,
        }
    }

    /// Directory appended to the library search path during one-time
    /// initialization and handed to the host module resolver.
    pub fn with_companion_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.companion_dir = Some(dir.into());
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn keeper(&self) -> &KeeperSlot {
        &self.keeper
    }

    pub fn is_model_running(&self) -> bool {
        self.model.is_some()
    }

    /// Top-level command. Always re-enables the invoking control on failure.
    pub fn execute_command(
        &mut self,
        ctx: &mut SessionContext,
        startup: &mut StartupContext,
    ) -> CommandResult {
        ctx.crash_handled = false;

        if ctx.state == SessionState::Running {
            let message = "payload is already running".to_string();
            startup.message = Some(message.clone());
            return CommandResult::Failed(message);
        }

        self.collaborators.ui.set_command_enabled(false);
        let started = guarded(|| {
            if startup.debug_requested() {
                if let Err(err) = startup.application.attach_debugger() {
                    tracing::warn!(
                        error = %format!("{err:#}"),
                        "debugger attach failed; continuing"
                    );
                }
            }
            self.initialize_once(ctx, startup)?;
            self.start(ctx, startup)
        });
        match started {
            Ok(()) => {
                ctx.state = SessionState::Running;
                tracing::info!("payload session running");
                CommandResult::Succeeded
            }
            Err(err) => self.fail_startup(ctx, startup, err),
        }
    }

    fn initialize_once(
        &mut self,
        ctx: &mut SessionContext,
        startup: &StartupContext,
    ) -> Result<()> {
        self.application = Some(Arc::clone(&startup.application));
        if ctx.initialized {
            return Ok(());
        }

        if let Some(dir) = &self.companion_dir {
            append_library_search_path(dir)?;
        }
        ctx.bound_document = startup.application.active_document_title();
        ctx.initialized = true;
        tracing::debug!(
            document = ctx.bound_document.as_deref().unwrap_or("<none>"),
            "session initialized"
        );
        Ok(())
    }

    fn start(&mut self, ctx: &mut SessionContext, startup: &StartupContext) -> Result<()> {
        ctx.state = SessionState::Starting;
        self.ensure_resolution_hook(ctx, startup.application.as_ref())?;

        let shutdown_started = ShutdownStartedHandler::new(self.idle.clone(), self.keeper.clone());
        let services = PayloadServices {
            idle: self.idle.clone(),
            keeper: self.keeper.clone(),
            shutdown_started: shutdown_started.clone(),
        };
        let mut model = self
            .factory
            .create(startup, services)
            .context("failed to construct payload model")?;
        model.show_ui().context("failed to show payload UI")?;
        if let Some(workspace) = startup.workspace_path() {
            model
                .open_workspace(&workspace)
                .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
        }

        let ui = &self.collaborators.ui;
        ui.subscribe(UiEvent::UnhandledFault);
        ctx.fault_hook_attached = true;
        ui.subscribe(UiEvent::Closed);
        ctx.closed_hook_attached = true;

        self.shutdown_started = Some(shutdown_started);
        self.model = Some(model);
        Ok(())
    }

    fn ensure_resolution_hook(
        &self,
        ctx: &mut SessionContext,
        application: &dyn HostApplication,
    ) -> Result<()> {
        if ctx.resolution_hook_registered {
            return Ok(());
        }
        if let Some(dir) = &self.companion_dir {
            application
                .register_module_resolver(dir)
                .context("failed to register module resolver")?;
            ctx.resolution_hook_registered = true;
        }
        Ok(())
    }

    fn fail_startup(
        &mut self,
        ctx: &mut SessionContext,
        startup: &mut StartupContext,
        err: anyhow::Error,
    ) -> CommandResult {
        let detail = format!("{err:#}");
        tracing::error!(error = %detail, "payload startup failed");
        self.model = None;
        self.shutdown_started = None;
        self.detach(ctx);
        ctx.state = SessionState::Closed;

        let collaborators = &self.collaborators;
        if let Err(log_err) = collaborators.instrumentation.log_exception(&detail) {
            collaborators.fallback.capture("startup failure logging", &log_err);
        }
        if let Err(report_err) = collaborators.stability.report_startup_failure(&detail) {
            collaborators
                .fallback
                .capture("startup failure reporting", &report_err);
        }
        collaborators.ui.show_message(STARTUP_FAILED_TITLE, &detail);
        collaborators.ui.set_command_enabled(true);

        startup.message = Some(detail.clone());
        CommandResult::Failed(detail)
    }

    /// Handles an unhandled fault raised on the UI dispatcher. The full
    /// reporting sequence runs at most once per command invocation; the
    /// invoking control is re-enabled whatever happens inside it.
    pub fn handle_unhandled_fault(
        &mut self,
        ctx: &mut SessionContext,
        fault: &mut FaultEvent,
    ) -> FaultDisposition {
        if !ctx.fault_hook_attached {
            return FaultDisposition::NotObserved;
        }

        fault.handled = true;
        if ctx.crash_handled {
            tracing::debug!(fault = %fault.description, "fault after crash handling; ignored");
            return FaultDisposition::AlreadyHandled;
        }
        ctx.crash_handled = true;
        tracing::error!(fault = %fault.description, "unhandled payload fault");

        let description = fault.description.clone();
        let reported = guarded(|| self.report_crash(&description));
        if let Err(err) = reported {
            self.collaborators.fallback.capture("crash reporting", &err);
        }

        let exited = guarded(|| self.prompt_and_force_exit(&description));
        if let Err(err) = exited {
            self.collaborators.fallback.capture("crash prompt", &err);
        }

        self.collaborators.ui.set_command_enabled(true);
        FaultDisposition::Handled
    }

    fn report_crash(&self, description: &str) -> Result<()> {
        self.collaborators
            .instrumentation
            .log_event("payload-crash", description);
        self.collaborators.instrumentation.log_exception(description)?;
        self.collaborators.stability.report_crash(description)
    }

    fn prompt_and_force_exit(&mut self, description: &str) -> Result<()> {
        self.collaborators.ui.show_crash_prompt(description)?;
        let Some(model) = self.model.as_mut() else {
            bail!("no payload model to shut down");
        };
        model.shutdown(false)
    }

    /// Forwarded from the payload model when it begins shutting down.
    pub fn on_model_shutdown_started(&mut self) -> Result<bool> {
        match &self.shutdown_started {
            Some(handler) => handler.shutdown_started(),
            None => Ok(false),
        }
    }

    /// Asks the running model to shut down, then tears the session down as
    /// [`on_ui_closed`](Self::on_ui_closed) does.
    pub fn close_payload(&mut self, ctx: &mut SessionContext) -> Result<()> {
        let shutdown = match self.model.as_mut() {
            Some(model) => guarded(|| model.shutdown(true)),
            None => Ok(()),
        };
        self.on_ui_closed(ctx);
        shutdown.context("payload model failed to shut down")
    }

    /// Tears the session down after the payload UI closed. Safe to call
    /// repeatedly.
    pub fn on_ui_closed(&mut self, ctx: &mut SessionContext) {
        self.detach(ctx);
        self.model = None;
        ctx.state = SessionState::Closed;
        self.collaborators.ui.set_command_enabled(true);
        tracing::info!("payload session closed");
    }

    // Idempotent: every hook is released at most once per attach.
    fn detach(&self, ctx: &mut SessionContext) {
        let ui = &self.collaborators.ui;
        if ctx.fault_hook_attached {
            ui.unsubscribe(UiEvent::UnhandledFault);
            ctx.fault_hook_attached = false;
        }
        if ctx.closed_hook_attached {
            ui.unsubscribe(UiEvent::Closed);
            ctx.closed_hook_attached = false;
        }
        if ctx.resolution_hook_registered {
            if let Some(application) = &self.application {
                application.unregister_module_resolver();
            }
            ctx.resolution_hook_registered = false;
        }
    }
}

// Runs `run`, turning a panic into an error.
fn guarded<T>(run: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))))
}
