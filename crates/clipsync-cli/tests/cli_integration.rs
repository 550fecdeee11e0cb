//! CLI Integration Tests
//!
//! These tests run the built binaries and check argument handling, startup
//! failures and exit codes. Nothing here needs a real clipboard: every
//! case fails or exits before the clipboard backend is touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

fn file_cmd() -> Command {
    Command::cargo_bin("clipsync-file").expect("Failed to find clipsync-file binary")
}

fn tcp_cmd() -> Command {
    Command::cargo_bin("clipsync-tcp").expect("Failed to find clipsync-tcp binary")
}

/// A local port with nothing listening on it
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

// ============================================================================
// clipsync-file Tests
// ============================================================================

#[test]
fn test_file_help() {
    file_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--poll-ms"))
        .stdout(predicate::str::contains("--interval-ms"));
}

#[test]
fn test_file_version() {
    file_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clipsync-file"));
}

#[test]
fn test_file_missing_path_argument() {
    file_cmd().assert().failure().code(1);
}

#[test]
fn test_file_nonexistent_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.txt");

    file_cmd()
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid path"));
}

#[test]
fn test_file_directory_is_not_a_valid_path() {
    let dir = TempDir::new().unwrap();

    file_cmd()
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid path"));
}

#[test]
fn test_file_unknown_backend() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clipboard.txt");
    std::fs::write(&path, "").unwrap();

    file_cmd()
        .arg(&path)
        .args(["--backend", "carrier-pigeon"])
        .assert()
        .failure()
        .code(1);
}

// ============================================================================
// clipsync-tcp Tests
// ============================================================================

#[test]
fn test_tcp_help() {
    tcp_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("client"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_tcp_invalid_mode() {
    tcp_cmd()
        .arg("relay")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_tcp_non_numeric_port() {
    tcp_cmd()
        .args(["client", "--port", "http"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_tcp_zero_max_peers_rejected() {
    tcp_cmd()
        .args(["server", "--max-peers", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--max-peers"));
}

#[test]
fn test_tcp_client_against_closed_port() {
    let port = closed_port();

    tcp_cmd()
        .args(["client", "--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--backend", "command"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to connect"));
}
