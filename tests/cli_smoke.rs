//! Smoke tests for the bount binary: argument parsing and the paths that
//! need no connection to a host.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cli_bin() -> Command {
    Command::cargo_bin("bount").expect("binary should build")
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"
[project]
name = "site"
local_root = "{root}"

[settings]
database = {{ engine = "django.db.backends.sqlite3", name = "db.sqlite" }}

[hosts.web1]
address = "127.0.0.1"
user = "deploy"
password = "unused"

[backup]
default = "archives"

[backup.destinations.archives]
kind = "client"
folder = "{root}/archives"
"#,
        root = dir.display()
    );
    let path = dir.join("bount.toml");
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn prints_help() {
    cli_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("remote-restore"))
        .stdout(predicate::str::contains("list-destinations"));
}

#[test]
fn prints_version() {
    cli_bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bount"));
}

#[test]
fn rejects_unknown_command() {
    cli_bin()
        .arg("not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn restore_needs_an_archive_name() {
    cli_bin()
        .arg("restore")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<NAME>"));
}

#[test]
fn rejects_unknown_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    cli_bin()
        .args(["--config", config.to_str().unwrap(), "--host", "nowhere", "list-destinations"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown host nowhere"));
}

#[test]
fn lists_destinations_without_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    cli_bin()
        .args(["--config", config.to_str().unwrap(), "list-destinations"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archives (default): local folder"));
}

#[test]
fn lists_no_backups_for_an_empty_folder() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    cli_bin()
        .args(["--config", config.to_str().unwrap(), "--host", "web1", "list-backups"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
