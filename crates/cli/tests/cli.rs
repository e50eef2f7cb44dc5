use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile, TempDir};

/// pushpilot with an empty home directory, so no user config leaks in
fn pushpilot(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pushpilot").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("PUSHPILOT_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn small_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"some bytes").unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    let home = tempdir().unwrap();
    pushpilot(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("completion"));
}

#[test]
fn test_completion_bash() {
    let home = tempdir().unwrap();
    pushpilot(&home)
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pushpilot"));
}

#[test]
fn test_completion_unknown_shell() {
    let home = tempdir().unwrap();
    pushpilot(&home)
        .args(["completion", "tcsh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported shell"));
}

#[test]
fn test_upload_missing_file() {
    let home = tempdir().unwrap();
    pushpilot(&home)
        .args([
            "upload",
            "/definitely/not/here.bin",
            "--url",
            "https://storage.example.com/put",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_upload_rejects_small_chunk_size() {
    let home = tempdir().unwrap();
    let file = small_file();
    pushpilot(&home)
        .arg("upload")
        .arg(file.path())
        .args(["--url", "https://storage.example.com/put", "--chunk-size-mb", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Chunk size should be between"));
}

#[test]
fn test_upload_without_url_needs_config() {
    let home = tempdir().unwrap();
    let file = small_file();
    pushpilot(&home)
        .arg("upload")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no configuration found"));
}

#[test]
fn test_doctor_without_config() {
    let home = tempdir().unwrap();
    pushpilot(&home)
        .args(["doctor", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration not found"));
}
