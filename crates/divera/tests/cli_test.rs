//! Integration tests for the `divera` CLI binary.
//!
//! Argument parsing, help output, config handling and a setup/status round
//! trip against a mocked Divera instance.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `divera` binary with env isolation.
///
/// Clears all `DIVERA_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn divera_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("divera");
    cmd.env("HOME", "/tmp/divera-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/divera-cli-test-nonexistent")
        .env_remove("DIVERA_CONFIG")
        .env_remove("DIVERA_PROFILE")
        .env_remove("DIVERA_OUTPUT")
        .env_remove("DIVERA_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn config_file(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = divera_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = divera_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    divera_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Divera")
            .and(predicate::str::contains("setup"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("vehicle"))
            .and(predicate::str::contains("diagnostics")),
    );
}

#[test]
fn test_version_flag() {
    divera_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("divera"));
}

#[test]
fn test_completions_bash() {
    divera_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_action_subcommands_exist() {
    divera_cmd()
        .args(["alarm", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("create")
                .and(predicate::str::contains("modify"))
                .and(predicate::str::contains("close")),
        );
    divera_cmd()
        .args(["vehicle", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("status")
                .and(predicate::str::contains("crew"))
                .and(predicate::str::contains("property")),
        );
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_status_without_profile_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("absent.toml"))
        .arg("status")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("divera setup"));
}

#[test]
fn test_unknown_action_is_rejected_by_parser() {
    divera_cmd()
        .args(["call", "launch_rocket", "--data", "{}"])
        .assert()
        .code(2);
}

#[test]
fn test_call_lists_missing_fields_before_any_request() {
    let output = divera_cmd()
        .args(["call", "modify_alarm", "--data", r#"{"alarm_id": 7, "title": null}"#])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("title"), "{text}");
    assert!(text.contains("notification_type"), "{text}");
}

#[test]
fn test_vehicle_property_needs_key_value() {
    divera_cmd()
        .args(["vehicle", "property", "1", "novalue"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn test_unknown_crew_mode_is_rejected_by_parser() {
    divera_cmd()
        .args(["vehicle", "crew", "1", "--mode", "swap", "5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("swap"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    let dir = tempfile::tempdir().unwrap();
    with_config(&dir.path().join("absent.toml"))
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("update_interval_data = 60"));
}

#[test]
fn test_interval_below_floor_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    with_config(&path)
        .args(["config", "set-intervals", "--data", "29"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("30"));
    with_config(&path)
        .args(["config", "set-intervals", "--alarm", "9"])
        .assert()
        .code(2);
    assert!(!path.exists(), "rejected intervals must not be saved");

    with_config(&path)
        .args(["config", "set-intervals", "--data", "30", "--alarm", "10"])
        .assert()
        .success();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("update_interval_data = 30"), "{saved}");
    assert!(saved.contains("update_interval_alarm = 10"), "{saved}");
}

#[test]
fn test_unit_interval_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(
        &dir,
        r#"
[profiles.default]
api_key = "k"

[[profiles.default.units]]
ucr_id = 100
name = "FF Musterstadt"
"#,
    );
    with_config(&path)
        .args(["config", "set-intervals", "--unit", "100", "--alarm", "15"])
        .assert()
        .success();
    with_config(&path)
        .args(["config", "set-intervals", "--unit", "999", "--alarm", "15"])
        .assert()
        .code(4);
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("update_interval_alarm = 15"), "{saved}");
}

#[test]
fn test_config_show_masks_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(
        &dir,
        "[profiles.default]\napi_key = \"super-secret\"\n",
    );
    with_config(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("super-secret").not());
}

// ── Against a mocked instance ───────────────────────────────────────

fn pull_all() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {
            "ucr": { "100": { "name": "FF Musterstadt", "usergroup_id": 4 } },
            "user": { "access": {} },
            "cluster": {
                "id": 5,
                "name": "FF Musterstadt",
                "vehicle": { "123456": { "id": 123456, "name": "HLF 20", "fmsstatus_id": 2 } },
                "status": []
            },
            "alarm": { "items": [] },
            "message_channel": { "items": [] }
        }
    }))
}

async fn mock_instance() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .and(query_param("accesskey", "cli-key"))
        .respond_with(pull_all())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v2/using-vehicle-property/get/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn test_setup_then_status_and_entities() {
    let server = mock_instance().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    with_config(&path)
        .args(["setup", "--api-key", "cli-key", "--plaintext", "--base-url"])
        .arg(server.uri())
        .assert()
        .success()
        .stderr(predicate::str::contains("FF Musterstadt (100)"));
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("ucr_id = 100"), "{saved}");

    with_config(&path)
        .args(["--output", "json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "online""#));

    with_config(&path)
        .args(["--output", "plain", "entities", "--kind", "vehicle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("100_vehicle_123456"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vehicle_status_is_sent() {
    let server = mock_instance().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/using-vehicles/set-status/123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = config_file(
        &dir,
        &format!(
            r#"
[profiles.default]
api_key = "cli-key"
base_url = "{}"

[[profiles.default.units]]
ucr_id = 100
name = "FF Musterstadt"
"#,
            server.uri()
        ),
    );

    with_config(&path)
        .args(["vehicle", "status", "123456", "--status-id", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vehicle:123456"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_diagnostics_redacts_key() {
    let server = mock_instance().await;
    let dir = tempfile::tempdir().unwrap();
    let path = config_file(
        &dir,
        &format!(
            "[profiles.default]\napi_key = \"cli-key\"\nbase_url = \"{}\"\n\n\
             [[profiles.default.units]]\nucr_id = 100\nname = \"FF Musterstadt\"\n",
            server.uri()
        ),
    );

    with_config(&path)
        .arg("diagnostics")
        .assert()
        .success()
        .stdout(predicate::str::contains("**REDACTED**").and(predicate::str::contains("cli-key").not()));
}
