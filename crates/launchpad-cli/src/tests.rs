use super::*;
use clap::error::ErrorKind;
use clap::CommandFactory;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::completion::write_completions_script;
use crate::console_host::{ConsoleApplication, ConsoleDocument};
use crate::dispatch::{
    console_services, launch_payload, log_filter_directive, parse_journal_entries, LaunchSettings,
};
use launchpad_core::{HostVersion, InstalledPayload, PayloadVersion};
use launchpad_installer::{LaunchConfig, LauncherLayout};
use launchpad_resolver::{Selection, SelectionSource};
use launchpad_revit_entry::RevitEntry;
use launchpad_runtime::{
    Dispatcher, ElementId, EntryPoint, HostApplication, HostDocument, IdleScheduler,
    ModuleLoader, StartupContext, TaskState, JOURNAL_DEBUG_KEY,
};
use crate::render::{
    format_install_lines, format_selection_line, output_style_from, render_status_line,
    OutputStyle, TerminalRenderer,
};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_layout() -> LauncherLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    LauncherLayout::new(std::env::temp_dir().join(format!(
        "launchpad-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    )))
}

fn host(value: &str) -> HostVersion {
    HostVersion::parse(value).expect("host version must parse")
}

fn version(value: &str) -> PayloadVersion {
    value.parse().expect("version must parse")
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "launchpad",
        "list",
        "--host",
        "2024",
        "--install-root",
        "/opt/payloads",
    ])
    .expect("must parse");

    assert!(matches!(cli.command, Commands::List));
    assert_eq!(cli.host_version.as_deref(), Some("2024"));
    assert_eq!(cli.install_root, Some(PathBuf::from("/opt/payloads")));
    assert_eq!(cli.prefix, None);
}

#[test]
fn cli_parses_launch_journal_entries() {
    let cli = Cli::try_parse_from([
        "launchpad",
        "launch",
        "--journal",
        "workspace_path=/work/site.lpw",
        "--journal",
        "mode=review",
        "--debug",
    ])
    .expect("must parse");

    let Commands::Launch { journal, debug } = cli.command else {
        panic!("expected launch command");
    };
    assert_eq!(journal, vec!["workspace_path=/work/site.lpw", "mode=review"]);
    assert!(debug);
}

#[test]
fn cli_rejects_non_numeric_select_index() {
    let err = Cli::try_parse_from(["launchpad", "select", "newest"])
        .expect_err("index must be numeric");
    assert_eq!(err.kind(), ErrorKind::ValueValidation);
}

#[test]
fn parse_journal_entries_splits_on_first_equals() {
    let journal = parse_journal_entries(
        &["workspace_path=/work/a=b.lpw".to_string(), "mode=".to_string()],
        false,
    )
    .expect("must parse");

    assert_eq!(
        journal.get("workspace_path").map(String::as_str),
        Some("/work/a=b.lpw")
    );
    assert_eq!(journal.get("mode").map(String::as_str), Some(""));
    assert!(!journal.contains_key(JOURNAL_DEBUG_KEY));
}

#[test]
fn parse_journal_entries_debug_flag_overrides_journal() {
    let journal =
        parse_journal_entries(&["debug=false".to_string()], true).expect("must parse");
    assert_eq!(journal.get(JOURNAL_DEBUG_KEY).map(String::as_str), Some("true"));
}

#[test]
fn parse_journal_entries_rejects_malformed_entries() {
    let missing = parse_journal_entries(&["workspace".to_string()], false)
        .expect_err("entry without '=' must fail");
    assert!(missing.to_string().contains("expected KEY=VALUE"));

    let empty_key = parse_journal_entries(&[" =value".to_string()], false)
        .expect_err("empty key must fail");
    assert!(empty_key.to_string().contains("key must not be empty"));
}

#[test]
fn log_filter_prefers_env_then_config_then_default() {
    assert_eq!(log_filter_directive(Some("debug"), Some("warn")), "debug");
    assert_eq!(log_filter_directive(Some("  "), Some("warn")), "warn");
    assert_eq!(log_filter_directive(None, None), "info");
}

#[test]
fn settings_flags_override_config_values() {
    let layout = test_layout();
    let config = LaunchConfig {
        install_root: Some(PathBuf::from("/config/payloads")),
        host_version: Some("2023".to_string()),
        log_filter: None,
    };
    let cli = Cli::try_parse_from(["launchpad", "resolve", "--host", "2025"]).expect("parse");

    let settings = LaunchSettings::from_sources(&cli, &config, layout).expect("settings");

    assert_eq!(settings.install_root, PathBuf::from("/config/payloads"));
    assert_eq!(settings.host, Some(host("2025")));
}

#[test]
fn settings_default_install_root_lives_under_prefix() {
    let layout = test_layout();
    let expected = layout.payloads_dir();
    let cli = Cli::try_parse_from(["launchpad", "doctor"]).expect("parse");

    let settings =
        LaunchSettings::from_sources(&cli, &LaunchConfig::default(), layout).expect("settings");

    assert_eq!(settings.install_root, expected);
    assert!(settings.require_host().is_err());
}

#[test]
fn settings_reject_invalid_host_version() {
    let cli = Cli::try_parse_from(["launchpad", "list", "--host", "../2024"]).expect("parse");
    let err = LaunchSettings::from_sources(&cli, &LaunchConfig::default(), test_layout())
        .expect_err("host with separators must fail");
    assert!(err.to_string().contains("invalid host version"));
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "selected 2.19.3"),
        "selected 2.19.3"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "selected 2.19.3"),
        "[OK] selected 2.19.3"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "restart host 2024"),
        "[WARN] restart host 2024"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "launching"),
        "[..] launching"
    );
}

#[test]
fn output_style_honors_override_and_terminal_detection() {
    assert_eq!(output_style_from(Some("rich"), true, false), OutputStyle::Rich);
    assert_eq!(output_style_from(Some("plain"), false, true), OutputStyle::Plain);
    assert_eq!(output_style_from(None, true, true), OutputStyle::Plain);
    assert_eq!(output_style_from(None, false, false), OutputStyle::Plain);
    assert_eq!(output_style_from(None, false, true), OutputStyle::Rich);
}

#[test]
fn install_lines_mark_resolved_candidate() {
    let host = host("2024");
    let old = InstalledPayload::new("/payloads/old", "Payload", version("0.6.2.0"));
    let new = InstalledPayload::new("/payloads/new", "Payload", version("2.19.3.6394"));
    let selection = Selection {
        entry_path: old.entry_path(&host),
        index: Some(0),
        source: SelectionSource::Persisted,
    };

    let lines = format_install_lines(&[old.clone(), new.clone()], &host, Some(&selection));

    assert_eq!(
        lines,
        vec![
            format!("* [0] Payload 0.6.2 ({})", old.entry_path(&host).display()),
            format!("  [1] Payload 2.19.3 ({})", new.entry_path(&host).display()),
        ]
    );
}

#[test]
fn selection_line_names_source() {
    let selection = Selection {
        entry_path: PathBuf::from("/payloads/new/entry.so"),
        index: Some(1),
        source: SelectionSource::Newest,
    };
    assert_eq!(
        format_selection_line(&selection),
        "/payloads/new/entry.so (source=newest)"
    );
}

#[test]
fn completion_script_names_the_binary() {
    let mut output = Vec::new();
    write_completions_script(crate::completion::CliCompletionShell::Bash, &mut output)
        .expect("must write completions");
    let script = String::from_utf8(output).expect("completion script is utf-8");
    assert!(script.contains("launchpad"));
    assert!(script.contains("select"));
}

#[test]
fn console_document_requires_matching_transaction() {
    let mut document = ConsoleDocument::default();

    assert!(document.delete_element(ElementId(1)).is_err());
    document.start_transaction("Edit").expect("start");
    assert!(document.start_transaction("Nested").is_err());
    document.delete_element(ElementId(1)).expect("delete inside transaction");
    assert!(document.commit_transaction("Other").is_err());
    document.commit_transaction("Edit").expect("commit");
    assert!(document.rollback_transaction("Edit").is_err());
}

#[test]
fn console_application_tracks_module_resolver() {
    let application = ConsoleApplication::new(host("2024"));
    let layout = test_layout();
    let dir = layout.prefix().join("Revit_2024");
    fs::create_dir_all(&dir).expect("must create dir");

    application
        .register_module_resolver(&dir)
        .expect("register resolver");
    assert_eq!(application.resolver_dir(), Some(dir));
    application.unregister_module_resolver();
    assert_eq!(application.resolver_dir(), None);
    assert_eq!(application.host_version(), "2024");

    let _ = fs::remove_dir_all(layout.prefix());
}

struct LinkedEntryLoader;

impl ModuleLoader for LinkedEntryLoader {
    fn load(&self, _path: &Path) -> anyhow::Result<Box<dyn EntryPoint>> {
        Ok(Box::new(RevitEntry::default()))
    }
}

fn write_entry_module(layout: &LauncherLayout) -> PathBuf {
    let entry_path = layout.prefix().join("Revit_2024").join("entry.so");
    fs::create_dir_all(entry_path.parent().expect("entry parent")).expect("must create dir");
    fs::write(&entry_path, b"module").expect("must write entry module");
    entry_path
}

#[test]
fn launch_runs_payload_session_through_idle_context() {
    let layout = test_layout();
    let entry_path = write_entry_module(&layout);
    let application = Arc::new(ConsoleApplication::new(host("2024")));
    let scheduler = IdleScheduler::spawn(ConsoleDocument::default()).expect("scheduler");
    let journal = parse_journal_entries(&["workspace_path=/work/site.lpw".to_string()], false)
        .expect("journal");
    let renderer = TerminalRenderer::from_style(OutputStyle::Plain);
    let startup = StartupContext::new(application.clone())
        .with_journal(journal)
        .with_services(console_services(&scheduler, renderer));

    let report = launch_payload(
        &Dispatcher::new(LinkedEntryLoader),
        &entry_path,
        startup,
        scheduler,
    )
    .expect("launch must succeed");

    assert_eq!(
        report.message.as_deref(),
        Some("payload ready for host 2024 with /work/site.lpw")
    );
    assert_eq!(report.started.tasks.len(), 1);
    assert_eq!(report.started.tasks[0].1, TaskState::Completed);
    assert_eq!(
        (report.closing.hooks_run, report.closing.hooks_removed),
        (1, 1)
    );
    assert_eq!(application.resolver_dir(), None);

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn launch_without_session_services_fails_and_stops_idle_context() {
    let layout = test_layout();
    let entry_path = write_entry_module(&layout);
    let scheduler = IdleScheduler::spawn(ConsoleDocument::default()).expect("scheduler");
    let idle = scheduler.handle();
    let startup = StartupContext::new(Arc::new(ConsoleApplication::new(host("2024"))));

    let err = launch_payload(
        &Dispatcher::new(LinkedEntryLoader),
        &entry_path,
        startup,
        scheduler,
    )
    .expect_err("startup without services must fail");

    assert!(format!("{err:#}").contains("session services"));
    assert!(idle.submit(|_scope| Ok(())).is_err());

    let _ = fs::remove_dir_all(layout.prefix());
}
