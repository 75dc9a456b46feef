mod common;

use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

#[test]
fn cli_version() {
    Command::cargo_bin("volley")
        .unwrap()
        .args(["-V"])
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_requires_url() {
    Command::cargo_bin("volley")
        .unwrap()
        .assert()
        .failure()
        .stderr(contains("--url"));
}

#[test]
fn cli_rejects_bad_numbers() {
    Command::cargo_bin("volley")
        .unwrap()
        .args(["--url", "http://127.0.0.1:1/", "--requests", "many"])
        .assert()
        .failure();
}

#[test]
fn cli_rejects_zero_workers() {
    Command::cargo_bin("volley")
        .unwrap()
        .args(["--url", "http://127.0.0.1:1/", "--workers", "0"])
        .assert()
        .failure()
        .stderr(contains("InvalidWorkerCount"));
}

#[test]
fn cli_prints_summary() {
    let url = format!("{}/ok", common::serve());
    Command::cargo_bin("volley")
        .unwrap()
        .args(["--url", &url, "--requests", "8", "--workers", "2"])
        .assert()
        .success()
        .stdout(contains("=== SUMMARY ==="))
        .stdout(contains("Successful"))
        .stdout(contains("P50 (Median)"));
}

#[test]
fn cli_reports_no_successes() {
    let url = format!("{}/missing", common::serve());
    Command::cargo_bin("volley")
        .unwrap()
        .args(["--url", &url, "--requests", "3"])
        .assert()
        .success()
        .stdout(contains("No successful requests"));
}

#[test]
fn cli_json_summary() {
    let url = format!("{}/ok", common::serve());
    let output = Command::cargo_bin("volley")
        .unwrap()
        .args(["--url", &url, "--requests", "5", "--rate", "100", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["submitted"], 5);
    assert_eq!(summary["successes"], 5);
    assert!(summary["latency"]["p99_ms"].is_number());
}
