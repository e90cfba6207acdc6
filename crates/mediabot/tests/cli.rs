use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A settings file that keeps every path inside `dir`
fn settings_in(dir: &Path) -> PathBuf {
    let settings = dir.join("settings.json");
    let content = serde_json::json!({
        "plugin_dir": dir.join("plugins"),
        "plugin_config_file": dir.join("plugins_config.json"),
        "event_workers": 2,
    });
    fs::write(&settings, content.to_string()).unwrap();
    settings
}

fn mediabot(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mediabot").unwrap();
    cmd.arg("--config").arg(settings_in(dir.path())).env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_ping_command() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("mediabot")?;
    cmd.arg("--ping");
    cmd.assert().success().stdout(predicate::str::contains("pong"));
    Ok(())
}

#[test]
fn test_plugin_list_shows_bundled_plugins() {
    let dir = tempfile::tempdir().unwrap();

    mediabot(&dir)
        .args(["plugin", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("download_notifier v1.1.0"))
        .stdout(predicate::str::contains("commands: history, test, clear"))
        .stdout(predicate::str::contains("compat_check v0.1.0"));

    assert!(dir.path().join("plugins/download_notifier/manifest.json").is_file());
}

#[test]
fn test_plugin_dir_flag_overrides_settings() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    mediabot(&dir)
        .arg("--plugin-dir")
        .arg(&empty)
        .args(["plugin", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins loaded."));
}

#[test]
fn test_rejected_plugin_is_listed() {
    let dir = tempfile::tempdir().unwrap();
    let plugins = dir.path().join("plugins");
    fs::create_dir_all(plugins.join("future")).unwrap();
    fs::write(
        plugins.join("future/manifest.json"),
        r#"{"name": "future", "dependencies": {"appVersion": ">=99.0"}}"#,
    )
    .unwrap();

    mediabot(&dir)
        .args(["plugin", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins loaded."))
        .stdout(predicate::str::contains("Rejected"))
        .stdout(predicate::str::contains(">=99.0"));
}

#[test]
fn test_command_runs_plugin_command() {
    let dir = tempfile::tempdir().unwrap();

    mediabot(&dir)
        .args(["command", "download_notifier", "test", "--arg", "message=hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sent: hello"));

    mediabot(&dir)
        .args(["command", "compat_check", "check", "--arg", "app_version=>=99.0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"success\": false"));
}

#[test]
fn test_command_errors_exit_with_failure() {
    let dir = tempfile::tempdir().unwrap();

    mediabot(&dir)
        .args(["command", "ghost", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));

    mediabot(&dir)
        .args(["command", "download_notifier", "history", "--arg", "kind=paused"])
        .assert()
        .failure();
}

#[test]
fn test_publish_events() {
    let dir = tempfile::tempdir().unwrap();

    mediabot(&dir)
        .args(["publish", "DownloadCompleted", "--data", r#"{"title": "Dune"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published DownloadCompleted"));

    mediabot(&dir)
        .args(["publish", "LibraryScanned", "--background"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published LibraryScanned"));

    mediabot(&dir)
        .args(["publish", "DownloadCompleted", "--data", "[1, 2]"])
        .assert()
        .failure();
}

#[test]
fn test_uninstall_removes_plugin_folder() {
    let dir = tempfile::tempdir().unwrap();

    mediabot(&dir)
        .args(["plugin", "uninstall", "compat_check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uninstalled compat_check"));
    assert!(!dir.path().join("plugins/compat_check").exists());

    mediabot(&dir)
        .args(["plugin", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("download_notifier"))
        .stdout(predicate::str::contains("compat_check").not());

    mediabot(&dir)
        .args(["plugin", "uninstall", "compat_check"])
        .assert()
        .failure();
}
