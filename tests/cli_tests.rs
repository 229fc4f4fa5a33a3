//! CLI Integration Tests
//!
//! Tests the fieldcalc binary directly using assert_cmd.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fieldcalc() -> Command {
    let mut cmd = Command::cargo_bin("fieldcalc").unwrap();
    cmd.env_remove("FIELDCALC_CONFIG").env_remove("RUST_LOG");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    fieldcalc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fieldcalc"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_cli_version() {
    fieldcalc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fieldcalc"));
}

#[test]
fn test_evaluate_help_lists_result_types() {
    fieldcalc()
        .args(["evaluate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("duration"));
}

// ═══════════════════════════════════════════════════════════════════════════
// EXTRACT / VALIDATE / CORRECT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_extract_json() {
    fieldcalc()
        .args(["extract", "Math.floor(amount / 2) + tax", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"amount\""))
        .stdout(predicate::str::contains("\"tax\""))
        .stdout(predicate::str::contains("floor").not());
}

#[test]
fn test_validate_valid_formula() {
    fieldcalc()
        .args([
            "validate",
            "converted_at - created_at",
            "--record",
            "test-data/deal.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_validate_invalid_formula_fails_with_suggestion() {
    fieldcalc()
        .args([
            "validate",
            "convertedAt - created_at",
            "--record",
            "test-data/deal.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("convertedAt"))
        .stdout(predicate::str::contains("converted_at"));
}

#[test]
fn test_validate_json_output() {
    fieldcalc()
        .args([
            "--json",
            "validate",
            "createdAt",
            "--record",
            "test-data/deal.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"isValid\": false"))
        .stdout(predicate::str::contains("\"createdAt\": \"created_at\""));
}

#[test]
fn test_correct_command() {
    fieldcalc()
        .args([
            "correct",
            "wonCount / (wonCount + lostCount)",
            "--record",
            "test-data/deal.json",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "won_count / (won_count + lost_count)",
        ))
        .stdout(predicate::str::contains("\"changed\": true"));
}

// ═══════════════════════════════════════════════════════════════════════════
// EVALUATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_evaluate_date_difference() {
    fieldcalc()
        .args([
            "evaluate",
            "converted_at - created_at",
            "--record",
            "test-data/deal.json",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("86400"));
}

#[test]
fn test_evaluate_duration_with_correction() {
    fieldcalc()
        .args([
            "evaluate",
            "convertedAt - createdAt",
            "--record",
            "test-data/deal.json",
            "--result-type",
            "duration",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 days"));
}

#[test]
fn test_evaluate_no_correct_fails() {
    fieldcalc()
        .args([
            "evaluate",
            "convertedAt - createdAt",
            "--record",
            "test-data/deal.json",
            "--no-correct",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("MissingFieldError"));
}

#[test]
fn test_evaluate_syntax_error_fails() {
    fieldcalc()
        .args(["evaluate", "(amount + 1", "--record", "test-data/deal.json", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("SyntaxError"));
}

#[test]
fn test_evaluate_with_sibling_formulas() {
    fieldcalc()
        .args([
            "evaluate",
            "cycle_days",
            "--record",
            "test-data/deal.json",
            "--formulas",
            "test-data/formulas.yaml",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("14.4"));
}

#[test]
fn test_evaluate_with_config_clock() {
    fieldcalc()
        .args([
            "--config",
            "test-data/config.yaml",
            "evaluate",
            "daysBetween(now(), created_at)",
            "--record",
            "test-data/deal.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("152"));
}

#[test]
fn test_invalid_result_type_rejected() {
    fieldcalc()
        .args([
            "evaluate",
            "1",
            "--record",
            "test-data/deal.json",
            "--result-type",
            "money",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown result type"));
}

#[test]
fn test_missing_record_file() {
    fieldcalc()
        .args(["evaluate", "1", "--record", "nonexistent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}

// ═══════════════════════════════════════════════════════════════════════════
// AGGREGATE / AUDIT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_aggregate_sample_data() {
    fieldcalc()
        .args([
            "aggregate",
            "--records",
            "test-data/deals.json",
            "--formulas",
            "test-data/formulas.yaml",
            "--charts",
            "test-data/charts.yaml",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("won"))
        .stdout(predicate::str::contains("1600"))
        .stdout(predicate::str::contains("1.75"));
}

#[test]
fn test_aggregate_json_output() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("records.yaml");
    let formulas = dir.path().join("formulas.json");
    let charts = dir.path().join("charts.json");
    fs::write(&records, "- {k: x, v: 10}\n- {k: x, v: 20}\n").unwrap();
    fs::write(&formulas, "[]").unwrap();
    fs::write(&charts, r#"[{"x_field": "k", "y_field": "v", "aggregation": "avg"}]"#).unwrap();

    fieldcalc()
        .arg("aggregate")
        .arg("--records")
        .arg(&records)
        .arg("--formulas")
        .arg(&formulas)
        .arg("--charts")
        .arg(&charts)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"category\": \"x\""))
        .stdout(predicate::str::contains("\"value\": 15.0"));
}

#[test]
fn test_audit_order() {
    fieldcalc()
        .args(["audit", "--formulas", "test-data/formulas.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cycle_seconds"))
        .stdout(predicate::str::contains("No circular references"));
}

#[test]
fn test_audit_cycle_fails() {
    fieldcalc()
        .args(["audit", "--formulas", "test-data/cyclic_formulas.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a -> b -> a"));
}
