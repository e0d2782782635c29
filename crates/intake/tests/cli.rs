use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn intake() -> Command {
    let mut cmd: Command = cargo_bin_cmd!("intake").into();
    cmd.env("NO_COLOR", "1");
    cmd
}

fn write_resume(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    intake()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("intake"));
}

#[test]
fn help_lists_subcommands() {
    intake()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("bulk"))
        .stdout(predicate::str::contains("inspect"));
}

// --- Inspect ---

#[test]
fn inspect_reports_extraction_stats_for_text_file() {
    let tmp = TempDir::new().unwrap();
    let path = write_resume(
        tmp.path(),
        "resume.txt",
        "Jane Doe\nSenior Engineer\nEmail: jane@example.com\nPhone: 555-123-4567\n",
    );

    intake()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"format\": \"txt\""))
        .stdout(predicate::str::contains("jane@example.com"));
}

#[test]
fn inspect_rejects_unsupported_extension() {
    let tmp = TempDir::new().unwrap();
    let path = write_resume(tmp.path(), "resume.xyz", "some content long enough here");

    intake()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation failed"));
}

#[test]
fn inspect_rejects_metadata_files() {
    let tmp = TempDir::new().unwrap();
    let path = write_resume(tmp.path(), "resume.metadata.json", "{}");

    intake()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"is_metadata_file\": true"));
}

// --- Parse ---

#[test]
fn parse_requires_ai_endpoint() {
    let tmp = TempDir::new().unwrap();
    let path = write_resume(tmp.path(), "resume.txt", "Jane Doe, engineer at Acme Corp");

    intake().arg("parse").arg(&path).assert().failure();
}

#[test]
fn parse_rejects_invalid_endpoint_url() {
    let tmp = TempDir::new().unwrap();
    let path = write_resume(tmp.path(), "resume.txt", "Jane Doe, engineer at Acme Corp");

    intake()
        .arg("parse")
        .arg(&path)
        .arg("--ai-endpoint")
        .arg("not a url")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ai-endpoint"));
}
