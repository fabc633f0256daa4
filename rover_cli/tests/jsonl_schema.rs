mod common;

use assert_cmd::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

use common::{write_config, write_trace};

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect()
}

/// Per-tick lines followed by one summary object.
#[rstest]
fn run_stream_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let out = Command::cargo_bin("rover")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--fast", "--max-ticks", "50", "--stream"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&out);
    assert_eq!(lines.len(), 51, "50 tick lines plus a summary");

    for (i, v) in lines[..50].iter().enumerate() {
        assert_eq!(v["tick"].as_u64(), Some(i as u64 + 1));
        assert_eq!(v["state"], "Running");
        for key in ["hazard", "x", "y", "heading", "left_duty", "right_duty", "valid"] {
            assert!(v.get(key).is_some(), "tick line missing {key}: {v}");
        }
        let duty = v["left_duty"].as_f64().unwrap();
        assert!((-1.0..=1.0).contains(&duty));
    }

    let summary = &lines[50];
    assert_eq!(summary["ticks"].as_u64(), Some(50));
    assert_eq!(summary["final_state"], "Idle");
    assert_eq!(summary["reason"], "TickBudget");
    assert!(summary["pose"]["x"].as_f64().unwrap() > 0.0, "robot moved forward");
    assert!(summary["latency_us"]["max"].is_u64());
}

#[rstest]
fn calibrate_gyro_json_reports_sim_bias() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out_path = dir.path().join("cal.toml");

    let out = Command::cargo_bin("rover")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .args(["calibrate-gyro", "--samples", "200", "--out"])
        .arg(&out_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&out);
    assert_eq!(lines.len(), 1);
    let v = &lines[0];
    assert_eq!(v["samples"].as_u64(), Some(200));
    let bias_z = v["gyro_bias"][2].as_f64().unwrap();
    assert!((bias_z - 0.002).abs() < 1e-6, "bias_z = {bias_z}");
}

#[rstest]
fn replay_emits_one_line_per_frame() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let trace = write_trace(&dir, 12, 2);

    let out = Command::cargo_bin("rover")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&out);
    assert_eq!(lines.len(), 12);
    assert_eq!(lines[0]["state"], "Running");
    assert_eq!(lines[11]["state"], "Idle");
    assert_eq!(lines[11]["left_duty"].as_f64(), Some(0.0));
}

#[rstest]
fn health_json_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let out = Command::cargo_bin("rover")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("health")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&out);
    let v = &lines[0];
    assert_eq!(v["status"], "ok");
    assert_eq!(v["state"], "Idle");
    assert_eq!(v["stale"].as_array().map(Vec::len), Some(0));
    assert!(v["battery_v"].as_f64().unwrap() > 8.0);
}
