use super::*;
use std::sync::atomic::{AtomicU64, Ordering};

use launchpad_core::{launch_error, HostVersion, LaunchError, PayloadVersion};
use std::fs;
use std::path::{Path, PathBuf};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_root_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "launchpad-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    build_test_root_path(nanos)
}

fn test_layout() -> LauncherLayout {
    LauncherLayout::new(test_root())
}

fn host(value: &str) -> HostVersion {
    HostVersion::parse(value).expect("host version must parse")
}

fn install_payload(base: &Path, dir: &str, version: &str, host: &HostVersion) -> PathBuf {
    let root = base.join(dir);
    fs::create_dir_all(&root).expect("must create install root");
    fs::write(
        root.join("payload.toml"),
        format!("name = \"Payload\"\nversion = \"{version}\"\n"),
    )
    .expect("must write manifest");

    let parsed: PayloadVersion = version.parse().expect("version must parse");
    let entry = launchpad_core::resolve_entry_path(&root, parsed, host);
    fs::create_dir_all(entry.parent().expect("entry has parent")).expect("must create entry dir");
    fs::write(&entry, b"module").expect("must write entry module");
    entry
}

#[test]
fn build_test_root_path_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_root_path(7), build_test_root_path(7));
}

#[test]
fn selection_path_is_named_after_host_version() {
    let layout = LauncherLayout::new("/home/user/.launchpad");
    assert_eq!(
        layout.selection_path(&host("2024")),
        PathBuf::from("/home/user/.launchpad/state/selections/2024.selection")
    );
    assert_eq!(
        layout.payloads_dir(),
        PathBuf::from("/home/user/.launchpad/payloads")
    );
    assert_eq!(
        layout.config_path(),
        PathBuf::from("/home/user/.launchpad/launchpad.toml")
    );
}

#[test]
fn selection_round_trip_is_byte_identical() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let entry = PathBuf::from("/opt/payloads/2.19/Revit_2024/entry module.so");

    write_selection(&layout, &host("2024"), &entry).expect("must write selection");
    let read = read_selection(&layout, &host("2024")).expect("must read selection");
    assert_eq!(read.as_deref(), Some(entry.as_path()));

    let raw = fs::read_to_string(layout.selection_path(&host("2024"))).expect("raw file");
    assert_eq!(raw, format!("{}\n", entry.display()));

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn selection_round_trip_keeps_surrounding_whitespace() {
    let layout = test_layout();
    let entry = PathBuf::from(" /opt/payload /libentry.so ");

    write_selection(&layout, &host("2024"), &entry).expect("must write selection");
    let read = read_selection(&layout, &host("2024")).expect("must read selection");

    assert_eq!(read, Some(entry));
    let _ = fs::remove_dir_all(layout.prefix());
}

#[cfg(unix)]
#[test]
fn selection_round_trip_keeps_non_utf8_bytes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let layout = test_layout();
    let entry = PathBuf::from(OsStr::from_bytes(b"/opt/p\xFF/libentry.so"));

    write_selection(&layout, &host("2024"), &entry).expect("must write selection");
    let raw = fs::read(layout.selection_path(&host("2024"))).expect("raw file");
    assert_eq!(raw, b"/opt/p\xFF/libentry.so\n".to_vec());
    assert_eq!(
        read_selection(&layout, &host("2024")).expect("must read selection"),
        Some(entry)
    );

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn selection_overwrite_replaces_old_value() {
    let layout = test_layout();

    write_selection(&layout, &host("2023"), Path::new("/a")).expect("first write");
    write_selection(&layout, &host("2023"), Path::new("/b")).expect("second write");
    let read = read_selection(&layout, &host("2023")).expect("must read");
    assert_eq!(read, Some(PathBuf::from("/b")));

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn selections_are_kept_per_host_version() {
    let layout = test_layout();

    write_selection(&layout, &host("2023"), Path::new("/a")).expect("write 2023");
    write_selection(&layout, &host("2024"), Path::new("/b")).expect("write 2024");
    assert_eq!(
        read_selection(&layout, &host("2023")).expect("read 2023"),
        Some(PathBuf::from("/a"))
    );
    assert_eq!(
        read_selection(&layout, &host("2024")).expect("read 2024"),
        Some(PathBuf::from("/b"))
    );

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn missing_or_blank_selection_reads_as_none() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");

    assert!(read_selection(&layout, &host("2024")).expect("must read").is_none());

    fs::write(layout.selection_path(&host("2024")), "  \n").expect("write blank");
    assert!(read_selection(&layout, &host("2024")).expect("must read").is_none());

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn stale_selection_is_not_valid() {
    let layout = test_layout();
    let missing = layout.prefix().join("gone").join("entry.so");

    write_selection(&layout, &host("2024"), &missing).expect("must write selection");
    assert!(read_valid_selection(&layout, &host("2024")).is_none());

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn existing_selection_is_valid() {
    let layout = test_layout();
    let entry = install_payload(layout.prefix(), "2.0", "2.0.0.0", &host("2024"));

    write_selection(&layout, &host("2024"), &entry).expect("must write selection");
    assert_eq!(read_valid_selection(&layout, &host("2024")), Some(entry));

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn clear_selection_reports_whether_a_file_was_removed() {
    let layout = test_layout();

    assert!(!clear_selection(&layout, &host("2024")).expect("missing is fine"));
    write_selection(&layout, &host("2024"), Path::new("/a")).expect("must write");
    assert!(clear_selection(&layout, &host("2024")).expect("must remove"));
    assert!(read_selection(&layout, &host("2024")).expect("must read").is_none());

    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn scan_missing_base_reports_detection_unavailable() {
    let base = test_root().join("does-not-exist");
    let err = InstallScanner::new(&base)
        .scan(&host("2024"))
        .expect_err("missing base must fail");
    assert!(matches!(
        launch_error(&err),
        Some(LaunchError::DetectionUnavailable { .. })
    ));
}

#[test]
fn scan_empty_base_returns_no_installs() {
    let base = test_root();
    fs::create_dir_all(&base).expect("must create base");

    let installs = InstallScanner::new(&base)
        .scan(&host("2024"))
        .expect("empty scan must succeed");
    assert!(installs.is_empty());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn scan_returns_installs_sorted_and_filters_missing_entry_modules() {
    let base = test_root();
    let host = host("2024");
    install_payload(&base, "two", "2.1.0.0", &host);
    install_payload(&base, "legacy", "0.6.2.0", &host);
    install_payload(&base, "one", "1.3.2.0", &host);
    // Entry module only exists for another host release.
    let other_host = HostVersion::parse("2022").expect("host");
    install_payload(&base, "other-host", "3.0.0.0", &other_host);

    let installs = InstallScanner::new(&base).scan(&host).expect("must scan");
    let versions: Vec<String> = installs.iter().map(|i| i.version.to_string()).collect();
    assert_eq!(versions, vec!["0.6.2.0", "1.3.2.0", "2.1.0.0"]);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn scan_skips_invalid_manifests() {
    let base = test_root();
    let host = host("2024");
    install_payload(&base, "good", "2.0.0.0", &host);
    let broken = base.join("broken");
    fs::create_dir_all(&broken).expect("must create broken root");
    fs::write(broken.join("payload.toml"), "version = \"not-a-version\"")
        .expect("write manifest");

    let installs = InstallScanner::new(&base).scan(&host).expect("must scan");
    assert_eq!(installs.len(), 1);
    assert_eq!(installs[0].install_root, base.join("good"));

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn scan_rereads_filesystem_on_every_call() {
    let base = test_root();
    let host = host("2024");
    fs::create_dir_all(&base).expect("must create base");
    let scanner = InstallScanner::new(&base);

    assert!(scanner.scan(&host).expect("first scan").is_empty());
    install_payload(&base, "new", "2.2.0.0", &host);
    assert_eq!(scanner.scan(&host).expect("second scan").len(), 1);

    let _ = fs::remove_dir_all(&base);
}

struct FailingDetector;

impl InstallDetector for FailingDetector {
    fn detect(&self, base: &Path) -> anyhow::Result<Vec<launchpad_core::InstalledPayload>> {
        Err(LaunchError::DetectionUnavailable {
            base: base.to_path_buf(),
            reason: "detector component missing".to_string(),
        }
        .into())
    }
}

#[test]
fn scan_propagates_detector_failure() {
    let base = test_root();
    fs::create_dir_all(&base).expect("must create base");

    let err = InstallScanner::with_detector(&base, FailingDetector)
        .scan(&host("2024"))
        .expect_err("detector failure must propagate");
    assert!(err.to_string().contains("detector component missing"));

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn config_defaults_when_file_missing() {
    let layout = test_layout();
    let config = LaunchConfig::load(&layout).expect("missing config is fine");
    assert_eq!(config, LaunchConfig::default());
}

#[test]
fn config_parses_known_keys() {
    let config = LaunchConfig::from_toml_str(
        r#"
install_root = "/opt/payloads"
host_version = "2024"
log_filter = "debug"
"#,
    )
    .expect("must parse");
    assert_eq!(config.install_root, Some(PathBuf::from("/opt/payloads")));
    assert_eq!(config.host_version.as_deref(), Some("2024"));
    assert_eq!(config.log_filter.as_deref(), Some("debug"));
}

#[test]
fn config_rejects_unknown_keys() {
    let err = LaunchConfig::from_toml_str("install_rot = \"/opt\"\n").expect_err("typo must fail");
    assert!(format!("{err:#}").contains("unknown field"));
}
