use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("sand").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("ps"));
}

#[test]
fn test_version_prints_version() {
    let mut cmd = Command::cargo_bin("sand").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_destroy_requires_confirmation() {
    let temp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("sand").unwrap();
    cmd.env("SANDFLOW_CONFIG_PATH", "/nonexistent")
        .arg("destroy")
        .arg("--path")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}
