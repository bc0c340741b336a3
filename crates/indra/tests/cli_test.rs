//! Integration tests for the `indra` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and the signed-out paths, all without reaching the
//! Indra cloud.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const NOWHERE: &str = "/tmp/indra-cli-test-nonexistent";

/// Nothing listens on the discard port, so an accidental request fails fast.
const DEAD_API: &str = "http://127.0.0.1:9";

/// Build a [`Command`] for the `indra` binary with env isolation.
///
/// Clears all `INDRA_*` env vars and points config and data directories at
/// `home` so tests never touch the user's real configuration.
fn indra_cmd_in(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("indra");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("INDRA_PROFILE")
        .env_remove("INDRA_EMAIL")
        .env_remove("INDRA_API_URL")
        .env_remove("INDRA_OUTPUT")
        .env_remove("INDRA_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn indra_cmd() -> assert_cmd::Command {
    indra_cmd_in(Path::new(NOWHERE))
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = indra_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    indra_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Indra EV chargers")
            .and(predicate::str::contains("login"))
            .and(predicate::str::contains("snapshot"))
            .and(predicate::str::contains("boost")),
    );
}

#[test]
fn test_version_flag() {
    indra_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("indra"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    indra_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    indra_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    indra_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = indra_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let output = indra_cmd()
        .args(["--output", "invalid", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about output format:\n{text}"
    );
}

#[test]
fn test_status_without_config() {
    indra_cmd()
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("indra config init"));
}

#[test]
fn test_unknown_profile() {
    indra_cmd()
        .args(["--profile", "holiday-home", "devices"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("holiday-home"));
}

#[test]
fn test_watch_interval_is_a_number() {
    let output = indra_cmd()
        .args(["watch", "--interval", "soon"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    // `config show` uses load_config_or_default() so it succeeds even
    // when no config file exists; it just renders the default config.
    indra_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn test_config_path_follows_xdg() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args([
            "--email",
            "driver@example.com",
            "config",
            "init",
            "--interval",
            "120",
        ])
        .assert()
        .success();

    let output = indra_cmd_in(home.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["default_profile"], "default");
    assert_eq!(shown["profiles"]["default"]["email"], "driver@example.com");
    assert_eq!(shown["profiles"]["default"]["poll_interval"], 120);

    indra_cmd_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default *"));
}

#[test]
fn test_config_init_needs_email_when_not_interactive() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--email"));
}

#[test]
fn test_set_interval_outside_window() {
    let home = tempfile::tempdir().unwrap();
    for secs in ["10", "301"] {
        indra_cmd_in(home.path())
            .args(["config", "set-interval", secs])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("interval"));
    }
}

#[test]
fn test_set_interval_updates_profile() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args(["--email", "driver@example.com", "config", "init"])
        .assert()
        .success();
    indra_cmd_in(home.path())
        .args(["config", "set-interval", "45"])
        .assert()
        .success();

    let output = indra_cmd_in(home.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["profiles"]["default"]["poll_interval"], 45);
}

#[test]
fn test_use_unknown_profile() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args(["config", "use", "garage"])
        .assert()
        .code(4);
}

// ── Signed-out session ──────────────────────────────────────────────

#[test]
fn test_status_signed_out() {
    let home = tempfile::tempdir().unwrap();
    let output = indra_cmd_in(home.path())
        .args([
            "--email",
            "driver@example.com",
            "--api-url",
            DEAD_API,
            "-o",
            "json",
            "status",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["account"], "driver@example.com");
    assert_eq!(status["auth"]["state"], "unauthenticated");
    assert_eq!(status["poll_interval_secs"], 60);

    // The device key was generated and stored on first use.
    let stored = home.path().join("data").join("indra").join("credentials.json");
    let text = std::fs::read_to_string(stored).unwrap();
    assert!(text.contains("driver@example.com"), "{text}");
}

#[test]
fn test_commands_need_sign_in() {
    let home = tempfile::tempdir().unwrap();
    for args in [
        vec!["snapshot"],
        vec!["devices"],
        vec!["boost", "start"],
        vec!["solar", "enable", "driveway"],
    ] {
        indra_cmd_in(home.path())
            .args(["--email", "driver@example.com", "--api-url", DEAD_API])
            .args(&args)
            .assert()
            .code(3)
            .stderr(predicate::str::contains("indra login"));
    }
}

#[test]
fn test_logout_when_signed_out() {
    let home = tempfile::tempdir().unwrap();
    indra_cmd_in(home.path())
        .args([
            "--email",
            "driver@example.com",
            "--api-url",
            DEAD_API,
            "logout",
            "--forget",
        ])
        .assert()
        .success();
}
