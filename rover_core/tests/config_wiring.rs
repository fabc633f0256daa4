mod common;

use common::Harness;
use rover_core::{DriveTarget, HazardState, LoopState};
use rover_traits::IrReading;

const TOML: &str = r#"
[drive]
wheel_radius_m = 0.016
wheelbase_m = 0.15

[encoder]
counts_per_rev = 48
gear_ratio = 30.0
counter_bits = 16

[control]
rate_hz = 250

[proximity]
floor_channels = ["left"]
line_threshold = 400

[safety]
fault_limit_ticks = 10
overrun_limit = 3
stop_debounce_n = 2

[calibration]
gyro_bias = [0.0, 0.0, 0.0125]
samples = 400
"#;

#[test]
fn config_file_drives_the_builder() {
    let cfg = rover_config::load_toml(TOML).expect("parse");
    cfg.validate().expect("valid");

    let h = Harness::new();
    let mut r = h.builder().with_config(&cfg).build().expect("build");
    assert_eq!(r.period_us(), 4_000);
    assert_eq!(r.gyro_bias_z(), 0.0125, "calibration wins over [fusion]");

    h.ir.set(Some(IrReading {
        left: 100,
        ..IrReading::default()
    }));
    assert_eq!(r.tick().hazard, HazardState::LineBoundary);

    r.enable().expect("enable");
    r.set_target(DriveTarget::new(1.0, 1.0));
    h.set_stop(true);
    assert_eq!(r.tick().state, LoopState::Running, "debounced");
    assert_eq!(r.tick().state, LoopState::Idle);
}
