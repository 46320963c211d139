use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn probe_prints_host_capabilities() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("probe");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("instruction set:"))
        .stdout(predicate::str::contains("logical cpus:"));
}

#[test]
fn list_names_the_battery() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("list");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("march"))
        .stdout(predicate::str::contains("walking_1"))
        .stdout(predicate::str::contains("address_line_test"));
}

#[test]
fn scalar_run_passes_on_good_memory() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("run")
        .arg("--scalar")
        .arg("--size")
        .arg("1MiB")
        .arg("--tests")
        .arg("basic_tests")
        .arg("--format")
        .arg("json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"total_errors\": 0"));
}

#[test]
fn report_is_written_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");

    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("run")
        .arg("--scalar")
        .arg("--size")
        .arg("1MiB")
        .arg("--tests")
        .arg("checkerboard,addressing")
        .arg("--output")
        .arg(&path);

    cmd.assert().success();

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report["lane"], "scalar");
    assert_eq!(report["total_errors"], 0);
    assert_eq!(report["tests"].as_array().unwrap().len(), 2);
}

#[test]
fn unknown_test_names_are_rejected() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("run").arg("--scalar").arg("--tests").arg("voodoo");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown test 'voodoo'"));
}

#[test]
fn garbage_sizes_are_rejected() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("run").arg("--scalar").arg("--size").arg("plenty");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized size"));
}

#[test]
fn undersized_buffers_are_rejected() {
    let mut cmd = Command::cargo_bin("ramscan").unwrap();
    cmd.arg("run").arg("--scalar").arg("--size").arg("16B");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("granule"));
}
