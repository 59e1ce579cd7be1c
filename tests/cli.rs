//! Integration suite driving the compiled `jestpool` binary against the
//! fake-framework scripts in `fixtures/`, covering mixed pass/fail/skip
//! output, hook failures, timeouts, nonzero exits, and empty output. Each
//! test builds its own temp working directory so runs never share a
//! `reports/test-status.json`.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn write_config(dir: &Path, mode: &str, max_workers: usize, timeout_secs: u64, selector: &str) {
    let config = format!(
        "mode = \"{mode}\"\nmax_workers = {max_workers}\ntimeout_secs = {timeout_secs}\ntest_selector = \"{selector}\"\n"
    );
    fs::write(dir.join("jestpool.toml"), config).unwrap();
}

fn status_json(dir: &Path) -> serde_json::Value {
    let content = fs::read_to_string(dir.join("reports").join("test-status.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn run_happy_path_all_pass() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("math.test.js"),
        "it('adds numbers', () => {});\n",
    )
    .unwrap();
    write_config(dir.path(), "perfile", 2, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-pass.sh"))
        .assert()
        .success();

    let status = status_json(dir.path());
    assert_eq!(status["summary"]["failed"], 0);
    assert_eq!(status["summary"]["passed"], 1);
    assert_eq!(status["summary"]["successRate"], "100.0%");
}

#[test]
fn run_mixed_pass_fail_skip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("suite.test.js"),
        "it('a', () => {});\nit('b', () => {});\nit('c', () => {});\nit('d', () => {});\nit('e', () => {});\n",
    )
    .unwrap();
    write_config(dir.path(), "perfile", 1, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-mixed.sh"))
        .assert()
        .failure()
        .code(1);

    let status = status_json(dir.path());
    assert_eq!(status["summary"]["passed"], 3);
    assert_eq!(status["summary"]["failed"], 1);
    assert_eq!(status["summary"]["skipped"], 1);
    let results = status["results"].as_array().unwrap();
    let failed = results
        .iter()
        .find(|r| r["status"] == "failed")
        .expect("one failed result");
    let err = failed["error"].as_str().unwrap();
    assert!(err.contains("Expected: 1"));
    assert!(err.contains("Received: 2"));
}

#[test]
fn run_subprocess_timeout_is_killed_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hangs.test.js"), "it('never resolves', () => {});\n").unwrap();
    write_config(dir.path(), "perfile", 1, 1, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-sleep.sh"))
        .assert()
        .failure()
        .code(1);

    let status = status_json(dir.path());
    let file_summary = &status["fileSummary"][0];
    assert_eq!(file_summary["status"], "failed");
    let error = file_summary["error"].as_str().unwrap();
    assert!(error.contains("timed out"));
}

#[test]
fn run_nonzero_exit_with_parseable_output_still_passes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("flaky.test.js"), "it('does the thing', () => {});\n").unwrap();
    write_config(dir.path(), "perfile", 1, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-nonzero-exit.sh"))
        .assert()
        .success();

    let status = status_json(dir.path());
    let file_summary = &status["fileSummary"][0];
    assert_eq!(file_summary["status"], "passed");
    let flaky_path = dir.path().join("flaky.test.js").display().to_string();
    let file_details = &status["fileDetails"][flaky_path.as_str()];
    assert_eq!(file_details["exitCode"], 1);
}

#[test]
fn run_hook_failure_synthesises_carrier_result() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("setup.test.js"),
        "beforeAll(() => { throw new Error('boom'); });\nit('never runs', () => {});\n",
    )
    .unwrap();
    write_config(dir.path(), "perfile", 1, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-hook-failure.sh"))
        .assert()
        .failure()
        .code(1);

    let status = status_json(dir.path());
    let results = status["results"].as_array().unwrap();
    let carrier = results
        .iter()
        .find(|r| r["name"] == "Test suite failed to run")
        .expect("synthesised suite-failure carrier");
    assert_eq!(carrier["status"], "failed");
    assert!(carrier["error"].as_str().unwrap().contains("beforeAll"));
}

#[test]
fn run_empty_output_is_reported_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("crashes.test.js"), "it('x', () => {});\n").unwrap();
    write_config(dir.path(), "perfile", 1, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .args(["run", "--framework-binary"])
        .arg(fixture("jest-empty.sh"))
        .assert()
        .failure()
        .code(1);

    let status = status_json(dir.path());
    let file_summary = &status["fileSummary"][0];
    assert_eq!(file_summary["status"], "failed");
    assert_eq!(file_summary["testCount"], 0);
    let error = file_summary["error"].as_str().unwrap();
    assert!(error.to_lowercase().contains("no output"));
}

#[test]
fn discover_subcommand_lists_tests_without_running_them() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.test.js"),
        "describe('Math', () => {\n  it('adds', () => {});\n  it.skip('subtracts', () => {});\n});\n",
    )
    .unwrap();
    write_config(dir.path(), "perfile", 1, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .arg("discover")
        .assert()
        .success()
        .stdout(predicate::str::contains("adds"))
        .stdout(predicate::str::contains("subtracts"))
        .stdout(predicate::str::contains("2 test(s)"));

    assert!(!dir.path().join("reports").join("test-status.json").exists());
}

#[test]
fn validate_config_rejects_zero_workers() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "perfile", 0, 10, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .arg("validate-config")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn validate_config_accepts_a_well_formed_file() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "pertest", 2, 300, "*.test.js");

    Command::cargo_bin("jestpool")
        .unwrap()
        .current_dir(dir.path())
        .arg("validate-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}
