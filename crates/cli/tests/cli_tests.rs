//! CLI integration tests

use std::process::Command;

fn pmon() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pmon"));
    command
        .env_remove("PMON_API_URL")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("TELEGRAM_CHAT_ID");
    command
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = pmon().arg("--help").output().expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Position Monitor"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("send"), "Should show send command");
    assert!(stdout.contains("verify"), "Should show verify command");
    assert!(stdout.contains("parse-log"), "Should show parse-log command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = pmon().arg("--version").output().expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("pmon"), "Should show binary name");
}

/// Test send subcommand help
#[test]
fn test_send_help() {
    let output = pmon()
        .args(["send", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--urgent"), "Should show urgent flag");
}

/// Test parse-log against a real file
#[test]
fn test_parse_log_prints_alerts() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("GridLog.csv");
    std::fs::write(
        &path,
        "13:48:12:331,ERROR,Broker Feed Disconnected,FZ20267,RF-20-NIFTY,HTTP_SHORT11_7\n",
    )
    .unwrap();

    let output = pmon()
        .args(["--format", "json", "parse-log"])
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries[0]["log_type"], "ERROR");
    assert_eq!(entries[0]["user_id"], "FZ20267");
}

/// Test parse-log rejects unknown row types
#[test]
fn test_parse_log_rejects_unknown_type() {
    let output = pmon()
        .args(["parse-log", "GridLog.csv", "--type", "INFO"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

/// Test verify fails fast without credentials
#[test]
fn test_verify_without_credentials_fails() {
    let home = tempfile::TempDir::new().unwrap();
    let output = pmon()
        .env("HOME", home.path())
        .arg("verify")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not configured"));
}

/// Test status against an unreachable daemon
#[test]
fn test_status_reports_unreachable_daemon() {
    let output = pmon()
        .args(["--api-url", "http://127.0.0.1:9", "status"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to reach the monitor"));
}
