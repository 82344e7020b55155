//! Integration tests for the xrserve binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn xrserve() -> Command {
    let mut cmd = Command::cargo_bin("xrserve").unwrap();
    cmd.env_remove("XRSERVE_HOST")
        .env_remove("XRSERVE_START_PORT")
        .env_remove("XRSERVE_END_PORT")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    xrserve()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_serve_requires_a_path() {
    xrserve().arg("serve").assert().failure();
}

#[test]
fn test_status_json_reports_range() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("xrserve.config.json");
    fs::write(&config, r#"{ "startPort": 38200, "endPort": 38210 }"#).unwrap();

    xrserve()
        .current_dir(temp.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""total": 11"#))
        .stdout(predicate::str::contains(r#""start": 38200"#));
}

#[test]
fn test_missing_config_file_fails() {
    let temp = TempDir::new().unwrap();

    xrserve()
        .current_dir(temp.path())
        .args(["status", "--config", "absent.json"])
        .assert()
        .failure();
}

#[test]
fn test_serve_missing_path_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("xrserve.config.json");
    fs::write(&config, r#"{ "startPort": 38220, "endPort": 38230, "preferredPorts": [] }"#).unwrap();

    xrserve()
        .current_dir(temp.path())
        .args(["serve", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist"));
}

#[test]
fn test_serve_rejects_port_outside_range() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("app")).unwrap();
    fs::write(temp.path().join("app/index.html"), "<body></body>").unwrap();
    let config = temp.path().join("xrserve.config.json");
    fs::write(&config, r#"{ "startPort": 38220, "endPort": 38230, "preferredPorts": [] }"#).unwrap();

    xrserve()
        .current_dir(temp.path())
        .args(["serve", "app", "--port", "80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the managed range 38220-38230"));
}
