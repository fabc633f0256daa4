mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

use common::write_config;

#[rstest]
#[case("ROVER_TEST_SIM_ENCODER_FAIL", 11, "Encoder counts stopped arriving")]
#[case("ROVER_TEST_SIM_IMU_SPIKES", 12, "SensorOutOfRange")]
#[case("ROVER_TEST_SIM_BRIDGE_FAIL", 15, "ActuatorFault")]
fn sim_faults_bubble_to_exit_code(
    #[case] env: &str,
    #[case] exit_code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    Command::cargo_bin("rover")
        .unwrap()
        .env(env, "10000")
        .arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .args(["run", "--fast", "--max-ticks", "500"])
        .assert()
        .code(exit_code)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn brief_encoder_dropout_is_absorbed() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    Command::cargo_bin("rover")
        .unwrap()
        .env("ROVER_TEST_SIM_ENCODER_FAIL", "2")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--fast", "--max-ticks", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("run complete: 100 ticks"));
}

#[rstest]
fn fault_json_carries_code_and_details() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[safety]\nfault_limit_ticks = 10\n");

    let out = Command::cargo_bin("rover")
        .unwrap()
        .env("ROVER_TEST_SIM_ENCODER_FAIL", "10000")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--fast", "--max-ticks", "500"])
        .assert()
        .code(11)
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no error object on stdout: {stdout}"));
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "SensorStale");
    assert_eq!(v["code"], 1);
    assert_eq!(v["sensor"], "encoders");
    assert_eq!(v["details"]["fault_limit_ticks"], 10);
    // Stale after 3 misses at 500 Hz, then 10 consecutive faulted ticks.
    assert_eq!(v["details"]["ticks"], 12);
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}
