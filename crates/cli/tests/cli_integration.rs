//! Integration tests for the `approvals` command line.

use assert_cmd::Command;
use predicates::prelude::*;

fn approvals() -> Command {
    Command::cargo_bin("approvals").expect("binary built")
}

#[test]
fn simulate_approve_prints_completed_case() {
    approvals()
        .args(["--quiet", "simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED"))
        .stdout(predicate::str::contains("manualTask"))
        .stdout(predicate::str::contains("last operator: executor-1"));
}

#[test]
fn simulate_reject_json_output() {
    let output = approvals()
        .args(["--quiet", "--output", "json", "simulate", "--decision", "reject"])
        .output()
        .expect("run simulate");
    assert!(output.status.success());
    let status: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON status");
    assert_eq!(status["state"], "REJECTED");
    assert!(status["currentTask"].is_null());
    assert_eq!(status["variables"]["lastComment"], "Rejected in simulation");
}

#[test]
fn simulate_rejects_non_object_payload() {
    approvals()
        .args(["--quiet", "simulate", "--payload", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--payload must be a JSON object"));
}

#[test]
fn serve_with_unknown_definition_fails_before_binding() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"definition_key = \"missingProcess\"\n").unwrap();
    approvals()
        .args(["serve", "--port", "0", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown process definition"));
}

#[test]
fn serve_with_bad_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"max_body_size = 0\n").unwrap();
    approvals()
        .args(["serve", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_body_size"));
}
