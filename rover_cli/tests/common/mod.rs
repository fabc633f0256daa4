#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

pub const BASE_CONFIG: &str = r#"
[drive]
wheel_radius_m = 0.016
wheelbase_m = 0.15

[encoder]
counts_per_rev = 48
gear_ratio = 30.0

[control]
rate_hz = 500

[sim]
wall_distance_m = 1.5
gyro_bias_z = 0.002
battery_v = 8.2
"#;

pub fn write_config(dir: &TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("rover.toml");
    fs::write(&path, format!("{BASE_CONFIG}\n{extra}")).unwrap();
    path
}

pub const TRACE_HEADER: &str = "t_us,left_count,right_count,gyro_x,gyro_y,gyro_z,accel_x,accel_y,accel_z,imu_fresh,ir_fl,ir_fr,ir_l,ir_r,tof_mm,stop,target_left,target_right";

/// A short straight-line trace: both wheels advance 3 counts per tick and the
/// last `stop_tail` rows assert the stop line.
pub fn write_trace(dir: &TempDir, rows: usize, stop_tail: usize) -> PathBuf {
    let mut s = String::from(TRACE_HEADER);
    s.push('\n');
    for i in 0..rows {
        let t = (i as u64 + 1) * 2000;
        let c = (i as u32) * 3;
        let stop = u8::from(i + stop_tail >= rows);
        s.push_str(&format!(
            "{t},{c},{c},0.0,0.0,0.0,0.0,0.0,9.81,1,150,150,900,900,1000,{stop},5.0,5.0\n"
        ));
    }
    let path = dir.path().join("trace.csv");
    fs::write(&path, s).unwrap();
    path
}
