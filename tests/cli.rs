// ABOUTME: Integration tests for the gitship binary.
// ABOUTME: Covers --help, input rejection before any network access, and log redaction.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

const TOKEN: &str = "ghp_cli_test_token_9f8e7d";

fn gitship_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gitship"));
    cmd.current_dir(dir);
    for var in [
        "GITSHIP_REPOSITORY",
        "GITSHIP_BRANCH",
        "GITSHIP_USER",
        "GITSHIP_HOST",
        "GITSHIP_SSH_PORT",
        "GITSHIP_KEY",
        "GITSHIP_PORT",
        "GITSHIP_APP",
        "GITSHIP_WORKDIR",
        "GITSHIP_CONFIG",
        "GITSHIP_LOG_FILE",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("GITSHIP_TOKEN", TOKEN);
    cmd
}

fn key_file(dir: &Path) -> String {
    let key = dir.join("id_test");
    fs::write(&key, "not a real key").unwrap();
    key.to_string_lossy().into_owned()
}

#[test]
fn help_shows_cleanup_flag() {
    let dir = tempfile::tempdir().unwrap();
    gitship_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--cleanup"))
        .stdout(predicate::str::contains("--repository"));
}

#[test]
fn non_https_repository_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let key = key_file(dir.path());
    let log = dir.path().join("logs/gitship.log");

    gitship_cmd(dir.path())
        .args([
            "--repository",
            "http://github.com/acme/widgets.git",
            "--host",
            "203.0.113.10",
            "--user",
            "deploy",
            "--key",
            &key,
            "--port",
            "3000",
            "--log-file",
        ])
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("InvalidInput"))
        .stderr(predicate::str::contains("must use https"));

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("deploy run started"));
    assert!(content.contains("outcome: InvalidInput"));
    assert!(!content.contains(TOKEN), "token leaked into the action log");
}

#[test]
fn missing_key_file_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("gitship.log");

    gitship_cmd(dir.path())
        .args([
            "--repository",
            "https://github.com/acme/widgets.git",
            "--host",
            "203.0.113.10",
            "--user",
            "deploy",
            "--key",
            "/nonexistent/id_ed25519",
            "--port",
            "3000",
            "--log-file",
        ])
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("private key file not found"));

    assert!(!fs::read_to_string(&log).unwrap().contains(TOKEN));
}

#[test]
fn cleanup_without_host_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let key = key_file(dir.path());
    let log = dir.path().join("gitship.log");

    gitship_cmd(dir.path())
        .args(["--cleanup", "--user", "deploy", "--key", &key, "--log-file"])
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("remote host"));

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("cleanup run started"));
}

#[test]
fn json_mode_reports_outcome_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("gitship.log");

    let assert = gitship_cmd(dir.path())
        .args(["--json", "--repository", "ftp://example.com/x", "--log-file"])
        .arg(&log)
        .assert()
        .code(2);

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let outcome: serde_json::Value = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v.get("exit_code").is_some())
        .expect("outcome line");
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["failed_stage"], "InvalidInput");
    assert_eq!(outcome["exit_code"], 2);
}

#[test]
fn unreadable_config_file_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("gitship.yml"), "unknown_key: 1\n").unwrap();
    let log = dir.path().join("gitship.log");

    gitship_cmd(dir.path())
        .arg("--log-file")
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("YAML"));
}

/// Test: SIGTERM while the SSH login waits on a host that never answers.
/// Expected: The run is finalized with exit 130 and an outcome line in the log.
#[cfg(unix)]
#[test]
fn sigterm_finalizes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("id_ed25519");
    fs::write(&key, support::TEST_KEY).unwrap();
    let log = dir.path().join("gitship.log");
    fs::write(
        dir.path().join("gitship.yml"),
        format!(
            "ssh:\n  connect_timeout: 60s\n  interactive_timeout: 60s\n  known_hosts: {}\n",
            dir.path().join("known_hosts").display()
        ),
    )
    .unwrap();

    // Accepts TCP connections into the backlog but never sends an SSH banner.
    let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = silent.local_addr().unwrap().port().to_string();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin!("gitship"))
        .current_dir(dir.path())
        .env_remove("SSH_AUTH_SOCK")
        .env("GITSHIP_TOKEN", TOKEN)
        .args(["--cleanup", "--host", "127.0.0.1", "--user", "deploy", "--ssh-port"])
        .arg(&port)
        .arg("--key")
        .arg(&key)
        .arg("--log-file")
        .arg(&log)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !fs::read_to_string(&log).is_ok_and(|c| c.contains("stage: connect")) {
        assert!(Instant::now() < deadline, "run never reached the connect stage");
        std::thread::sleep(Duration::from_millis(50));
    }
    // Give the runtime a moment to install its signal handlers.
    std::thread::sleep(Duration::from_millis(200));

    let killed = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("outcome: interrupted during 'connect'"));
    drop(silent);
}
