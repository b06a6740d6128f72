//! Integration tests for the `vmplex` CLI binary.
//!
//! Every test runs against the bundled fixture and a settings file in a
//! temporary directory, so the user's real configuration is never read.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const BUILD_AGENT: &str = "6A1D8E2C-3F4B-4C5D-8E9F-0A1B2C3D4E5F";
const KERNEL_DEBUG: &str = "B7E2F3A4-5C6D-4E7F-9A0B-1C2D3E4F5A6B";
const INSIDER: &str = "C8F3A4B5-6D7E-4F80-A1B2-C3D4E5F6A7B8";
const HOST: &str = "D0000000-0000-0000-0000-000000000001";

// ── Helpers ─────────────────────────────────────────────────────────

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample.json")
}

/// Build a command for the `vmplex` binary with env isolation and the
/// settings file inside `dir`.
fn vmplex_cmd(dir: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vmplex");
    cmd.env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("VMPLEX_SETTINGS", dir.path().join("settings.json"))
        .env_remove("VMPLEX_FIXTURE")
        .env_remove("VMPLEX_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn with_fixture(dir: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = vmplex_cmd(dir);
    cmd.arg("--fixture").arg(fixture());
    cmd
}

fn stdout_of(cmd: &mut assert_cmd::Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = vmplex_cmd(&dir).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    vmplex_cmd(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vmplex"));
}

#[test]
fn test_missing_fixture_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    vmplex_cmd(&dir)
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--fixture"));
}

// ── Listing ─────────────────────────────────────────────────────────

#[test]
fn test_list_plain_skips_host_system() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_of(with_fixture(&dir).args(["list", "-o", "plain"]));
    let guids: Vec<&str> = out.lines().collect();
    assert_eq!(guids, vec![BUILD_AGENT, KERNEL_DEBUG, INSIDER]);
    assert!(!out.contains(HOST));
}

#[test]
fn test_list_filters_running() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_of(with_fixture(&dir).args(["list", "--running", "-o", "plain"]));
    assert_eq!(out.trim(), BUILD_AGENT);
}

#[test]
fn test_list_json_includes_polled_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let out = stdout_of(with_fixture(&dir).args(["list", "-n", "build", "-o", "json"]));
    let vms: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(vms.as_array().unwrap().len(), 1);
    assert_eq!(vms[0]["main"]["name"], "build-agent");
    assert_eq!(vms[0]["summary"]["processor_load"], 37);
}

#[test]
fn test_list_table_shows_state() {
    let dir = tempfile::tempdir().unwrap();
    with_fixture(&dir)
        .args(["list", "--color", "never"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("kernel-debug")
                .and(predicate::str::contains("Saved"))
                .and(predicate::str::contains("Running")),
        );
}

// ── State changes ───────────────────────────────────────────────────

#[test]
fn test_start_by_name_reports_new_state() {
    let dir = tempfile::tempdir().unwrap();
    with_fixture(&dir)
        .args(["start", "kernel-debug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'kernel-debug' is now Running"));
}

#[test]
fn test_unknown_vm_exits_not_found() {
    let dir = tempfile::tempdir().unwrap();
    with_fixture(&dir)
        .args(["stop", "no-such-vm"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_host_system_cannot_be_targeted() {
    let dir = tempfile::tempdir().unwrap();
    with_fixture(&dir).args(["turn-off", HOST]).assert().code(4);
}

// ── Watch ───────────────────────────────────────────────────────────

#[test]
fn test_watch_stops_after_duration() {
    let dir = tempfile::tempdir().unwrap();
    with_fixture(&dir)
        .args(["watch", "--duration", "300ms", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains(INSIDER));
}

// ── Settings ────────────────────────────────────────────────────────

#[test]
fn test_settings_path_honors_env() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().join("settings.json");
    vmplex_cmd(&dir)
        .args(["settings", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_discovered_vms_are_recorded_in_settings() {
    let dir = tempfile::tempdir().unwrap();
    stdout_of(with_fixture(&dir).arg("list"));

    let out = stdout_of(vmplex_cmd(&dir).args(["settings", "show", "-o", "plain"]));
    assert_eq!(out.lines().count(), 3);
    assert!(out.contains(KERNEL_DEBUG));
}

#[test]
fn test_set_debugger_persists_arguments() {
    let dir = tempfile::tempdir().unwrap();
    stdout_of(with_fixture(&dir).arg("list"));

    vmplex_cmd(&dir)
        .args(["settings", "set-debugger", "kernel-debug", "-k net:port=50000"])
        .assert()
        .success();

    let raw = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
    assert!(raw.contains("-k net:port=50000"));
}

#[test]
fn test_set_debugger_unknown_vm() {
    let dir = tempfile::tempdir().unwrap();
    vmplex_cmd(&dir)
        .args(["settings", "set-debugger", "ghost", "-k"])
        .assert()
        .code(4);
}
