//! Smoke tests -- verify the binary runs and key modules load.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("presencewatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Behavioral pattern mining and risk correlation",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("presencewatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("presencewatch"));
}

#[test]
fn test_analyze_subcommand_exists() {
    Command::cargo_bin("presencewatch")
        .unwrap()
        .arg("analyze")
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_retention_subcommand_exists() {
    Command::cargo_bin("presencewatch")
        .unwrap()
        .args(["retention", "--help"])
        .assert()
        .success();
}

#[test]
fn test_analyze_runs_against_fresh_db() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("presencewatch.toml");
    let db_path = dir.path().join("pw.db");
    std::fs::write(
        &config_path,
        format!("[storage]\ndb_path = \"{}\"\n", db_path.display()),
    )
    .unwrap();

    Command::cargo_bin("presencewatch")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap()])
        .args(["analyze", "--subject", "emp-1"])
        .assert()
        .success()
        .stdout(predicates::str::contains("PresenceWatch Analysis"));
}
