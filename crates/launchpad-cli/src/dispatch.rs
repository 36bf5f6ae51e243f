use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use launchpad_core::{launch_error, HostVersion, InstalledPayload, LaunchError};
use launchpad_installer::{
    default_user_prefix, read_selection, InstallScanner, LaunchConfig, LauncherLayout,
};
use launchpad_resolver::VersionSelector;
use launchpad_runtime::{
    append_library_search_path, library_search_var, Dispatcher, HostServices, IdlePassReport,
    IdleScheduler, ModuleLoader, SessionCollaborators, StartupContext, TaskState,
    TracingFallbackSink, JOURNAL_DEBUG_KEY,
};
use tracing_subscriber::EnvFilter;

use crate::completion::write_completions_script;
use crate::console_host::{
    ConsoleApplication, ConsoleDocument, ConsoleReporting, ConsoleRestartNotifier, ConsoleUi,
};
use crate::render::{format_install_lines, format_selection_line, TerminalRenderer};
use crate::{Cli, Commands};

pub(crate) const LOG_FILTER_ENV: &str = "LAUNCHPAD_LOG";
const DEFAULT_LOG_FILTER: &str = "info";
const HOST_GUIDANCE: &str = "pass --host VERSION or set host_version in launchpad.toml";

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Completions { shell } => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            return write_completions_script(*shell, &mut lock);
        }
        Commands::Version => {
            println!("launchpad {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let prefix = match &cli.prefix {
        Some(prefix) => prefix.clone(),
        None => default_user_prefix()?,
    };
    let layout = LauncherLayout::new(prefix);
    let config = LaunchConfig::load(&layout)?;
    init_tracing(&log_filter_directive(
        std::env::var(LOG_FILTER_ENV).ok().as_deref(),
        config.log_filter.as_deref(),
    ));
    let settings = LaunchSettings::from_sources(&cli, &config, layout)?;
    let renderer = TerminalRenderer::current();

    match cli.command {
        Commands::List => run_list(&settings, renderer),
        Commands::Resolve => {
            let host = settings.require_host()?;
            let candidates = scan_or_empty(&settings, host)?;
            let selector = VersionSelector::new(&settings.layout, host.clone(), candidates);
            let selection = selector.resolve_default()?;
            println!("{}", format_selection_line(&selection));
            Ok(())
        }
        Commands::Select { index } => {
            let host = settings.require_host()?;
            let candidates = scan_or_empty(&settings, host)?;
            let selector = VersionSelector::new(&settings.layout, host.clone(), candidates);
            let notifier = ConsoleRestartNotifier::new(renderer);
            let entry = selector.persist_selection(index, &notifier)?;
            renderer.print_status("ok", &format!("selected {}", entry.display()));
            Ok(())
        }
        Commands::Launch { journal, debug } => {
            let journal = parse_journal_entries(&journal, debug)?;
            run_launch(&settings, journal, renderer)
        }
        Commands::Doctor => run_doctor(&settings, renderer),
        Commands::Completions { .. } | Commands::Version => Ok(()),
    }
}

/// Effective settings after applying flags over `launchpad.toml`.
#[derive(Debug)]
pub(crate) struct LaunchSettings {
    pub(crate) layout: LauncherLayout,
    pub(crate) install_root: PathBuf,
    pub(crate) host: Option<HostVersion>,
}

impl LaunchSettings {
    pub(crate) fn from_sources(
        cli: &Cli,
        config: &LaunchConfig,
        layout: LauncherLayout,
    ) -> Result<Self> {
        let install_root = cli
            .install_root
            .clone()
            .or_else(|| config.install_root.clone())
            .unwrap_or_else(|| layout.payloads_dir());
        let host = cli
            .host_version
            .as_deref()
            .or(config.host_version.as_deref())
            .map(HostVersion::parse)
            .transpose()
            .context("invalid host version")?;
        Ok(Self {
            layout,
            install_root,
            host,
        })
    }

    pub(crate) fn require_host(&self) -> Result<&HostVersion> {
        self.host
            .as_ref()
            .ok_or_else(|| anyhow!("no host version configured; {HOST_GUIDANCE}"))
    }
}

pub(crate) fn log_filter_directive(env: Option<&str>, config: Option<&str>) -> String {
    env.map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| config.map(str::trim).filter(|value| !value.is_empty()))
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!(
            "warning: invalid log filter '{directive}' ({err}); using '{DEFAULT_LOG_FILTER}'"
        );
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(crate) fn parse_journal_entries(
    entries: &[String],
    debug: bool,
) -> Result<BTreeMap<String, String>> {
    let mut journal = BTreeMap::new();
    for raw in entries {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid journal entry '{raw}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid journal entry '{raw}': key must not be empty");
        }
        journal.insert(key.to_string(), value.to_string());
    }
    if debug {
        journal.insert(JOURNAL_DEBUG_KEY.to_string(), "true".to_string());
    }
    Ok(journal)
}

/// Scans for installs, treating an unavailable install root as zero installs
/// so a persisted selection can still be used.
fn scan_or_empty(settings: &LaunchSettings, host: &HostVersion) -> Result<Vec<InstalledPayload>> {
    match InstallScanner::new(&settings.install_root).scan(host) {
        Ok(candidates) => Ok(candidates),
        Err(err)
            if matches!(
                launch_error(&err),
                Some(LaunchError::DetectionUnavailable { .. })
            ) =>
        {
            tracing::warn!(error = %format!("{err:#}"), "installation detection unavailable");
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

fn run_list(settings: &LaunchSettings, renderer: TerminalRenderer) -> Result<()> {
    let host = settings.require_host()?;
    let candidates = InstallScanner::new(&settings.install_root).scan(host)?;
    if candidates.is_empty() {
        renderer.print_status(
            "warn",
            &format!(
                "no payloads installed for host {host} under {}",
                settings.install_root.display()
            ),
        );
        return Ok(());
    }

    let selector = VersionSelector::new(&settings.layout, host.clone(), candidates);
    let resolved = selector.resolve_default().ok();
    renderer.print_section(&format!("Payloads for host {host}"));
    renderer.print_lines(&format_install_lines(
        selector.candidates(),
        host,
        resolved.as_ref(),
    ));
    Ok(())
}

fn run_launch(
    settings: &LaunchSettings,
    journal: BTreeMap<String, String>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let host = settings.require_host()?;
    let candidates = scan_or_empty(settings, host)?;
    let selection = VersionSelector::new(&settings.layout, host.clone(), candidates)
        .resolve_default()?;
    renderer.print_status(
        "step",
        &format!("launching {}", format_selection_line(&selection)),
    );

    let application = Arc::new(ConsoleApplication::new(host.clone()));
    let scheduler = IdleScheduler::spawn(ConsoleDocument::default())?;
    let mut startup = StartupContext::new(application)
        .with_journal(journal)
        .with_services(console_services(&scheduler, renderer));
    if let Some(dir) = selection.entry_path.parent() {
        if append_library_search_path(dir)? {
            renderer.print_status(
                "step",
                &format!("search path: {}+={}", library_search_var(), dir.display()),
            );
        }
        startup = startup.with_companion_dir(dir);
    }

    let report = launch_payload(
        &Dispatcher::default(),
        &selection.entry_path,
        startup,
        scheduler,
    )?;

    renderer.print_status("ok", &format!("started {}", selection.entry_path.display()));
    if let Some(message) = &report.message {
        renderer.print_status("step", message);
    }
    for (label, pass) in [("startup", &report.started), ("shutdown", &report.closing)] {
        let faulted = pass
            .tasks
            .iter()
            .filter(|(_, state)| *state == TaskState::Faulted)
            .count();
        let status = if faulted == 0 { "ok" } else { "warn" };
        renderer.print_status(
            status,
            &format!(
                "{label} idle pass ran {} task(s), {faulted} faulted, {} hook(s)",
                pass.tasks.len(),
                pass.hooks_run
            ),
        );
    }
    Ok(())
}

pub(crate) fn console_services(
    scheduler: &IdleScheduler,
    renderer: TerminalRenderer,
) -> HostServices {
    let reporting = Arc::new(ConsoleReporting);
    HostServices {
        idle: scheduler.handle(),
        collaborators: SessionCollaborators {
            ui: Arc::new(ConsoleUi::new(renderer)),
            instrumentation: reporting.clone(),
            stability: reporting,
            fallback: Arc::new(TracingFallbackSink),
        },
    }
}

#[derive(Debug)]
pub(crate) struct LaunchReport {
    pub(crate) started: IdlePassReport,
    pub(crate) closing: IdlePassReport,
    pub(crate) message: Option<String>,
}

/// Dispatches the entry module, gives the host one idle pass, shuts the
/// payload down and gives it a second idle pass for its cleanup hooks.
pub(crate) fn launch_payload<L: ModuleLoader>(
    dispatcher: &Dispatcher<L>,
    entry_path: &Path,
    mut startup: StartupContext,
    scheduler: IdleScheduler,
) -> Result<LaunchReport> {
    let idle = scheduler.handle();
    let loaded = match dispatcher.dispatch(entry_path, &mut startup) {
        Ok(loaded) => loaded,
        Err(err) => {
            scheduler.shutdown()?;
            return Err(err);
        }
    };

    let started = idle.notify_idle_and_wait();
    let message = startup.message.take();
    let closed = loaded.shutdown(&mut startup);
    let closing = idle.notify_idle_and_wait();
    // Idle work may call into the payload, so the module stays loaded until the
    // idle context has stopped.
    scheduler.shutdown()?;
    drop(loaded);

    closed?;
    Ok(LaunchReport {
        started: started?,
        closing: closing?,
        message,
    })
}

fn run_doctor(settings: &LaunchSettings, renderer: TerminalRenderer) -> Result<()> {
    let layout = &settings.layout;
    let mut lines = vec![
        format!("prefix: {}", layout.prefix().display()),
        format!("config: {}", describe_presence(layout.config_path())),
        format!("install root: {}", describe_presence(settings.install_root.clone())),
    ];

    match settings.host.as_ref() {
        Some(host) => {
            lines.push(format!("host: {host}"));
            lines.push(format!(
                "selection file: {}",
                layout.selection_path(host).display()
            ));
            let selected = match read_selection(layout, host)? {
                Some(path) => path.display().to_string(),
                None => "<none>".to_string(),
            };
            lines.push(format!("selection: {selected}"));

            let candidates = scan_or_empty(settings, host)?;
            let selector = VersionSelector::new(layout, host.clone(), candidates);
            match selector.resolve_default() {
                Ok(selection) => {
                    lines.push(format!("resolved: {}", format_selection_line(&selection)));
                    if let Some(dir) = selection.entry_path.parent() {
                        lines.push(format!(
                            "search path entry: {}={}",
                            library_search_var(),
                            dir.display()
                        ));
                    }
                }
                Err(err) => lines.push(format!("resolved: <none> ({err})")),
            }
        }
        None => lines.push(format!("host: <unset> ({HOST_GUIDANCE})")),
    }

    renderer.print_section("Doctor");
    renderer.print_lines(&lines);
    Ok(())
}

fn describe_presence(path: PathBuf) -> String {
    let state = if path.exists() { "present" } else { "missing" };
    format!("{} ({state})", path.display())
}
