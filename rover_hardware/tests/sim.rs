use rover_hardware::{HwError, SimParams, SimRobot};
use rover_traits::{BatteryMonitor, Encoders, Imu, IrArray, MotorBridge, RangeSensor, StatusLeds};
use rstest::rstest;

fn drive(robot: &SimRobot, left: f32, right: f32, steps: usize) {
    let mut bridge = robot.bridge();
    let mut enc = robot.encoders();
    bridge.enable().unwrap();
    bridge.set_duty(left, right).unwrap();
    for _ in 0..steps {
        enc.read_counts().unwrap();
    }
}

#[test]
fn straight_drive_moves_along_x() {
    let robot = SimRobot::default();
    drive(&robot, 0.5, 0.5, 500);
    let s = robot.state();
    assert!(s.x > 0.2, "x = {}", s.x);
    assert!(s.y.abs() < 1e-4);
    assert!(s.heading.abs() < 1e-4);
    assert_eq!(s.steps, 500);
    assert_eq!(s.t_us, 1_000_000);
}

#[test]
fn disabled_bridge_ignores_duty() {
    let robot = SimRobot::default();
    let mut bridge = robot.bridge();
    let mut enc = robot.encoders();
    bridge.set_duty(1.0, 1.0).unwrap();
    for _ in 0..100 {
        enc.read_counts().unwrap();
    }
    assert_eq!(robot.state().x, 0.0);
    assert_eq!(enc.read_counts().unwrap().left, 0);
}

#[rstest]
#[case(0.5, -0.5, 1.0)]
#[case(-0.5, 0.5, -1.0)]
fn spin_direction_matches_gyro(#[case] left: f32, #[case] right: f32, #[case] sign: f32) {
    let robot = SimRobot::new(SimParams {
        gyro_bias_z: 0.0,
        ..SimParams::default()
    });
    drive(&robot, left, right, 50);
    let gz = robot.imu().latest().unwrap().unwrap().gyro[2];
    // Right wheel faster turns counter-clockwise (positive).
    assert!(gz * -sign > 0.0, "gz = {gz}");
    assert!(robot.state().heading * -sign > 0.0);
}

#[test]
fn counters_wrap_at_sixteen_bits() {
    let robot = SimRobot::new(SimParams {
        counts_per_wheel_rev: 100_000.0,
        ..SimParams::default()
    });
    drive(&robot, 1.0, 1.0, 2_000);
    let counts = robot.encoders().read_counts().unwrap();
    assert!(counts.left < 65_536);
    assert!(counts.right < 65_536);
}

#[test]
fn wall_feeds_tof_and_front_ir() {
    let robot = SimRobot::new(SimParams {
        wall_distance_m: 0.5,
        ..SimParams::default()
    });
    let mut range = robot.range();
    let mut ir = robot.ir();
    assert_eq!(range.latest_mm().unwrap(), Some(500));
    assert_eq!(range.latest_mm().unwrap(), None);

    let far = ir.latest().unwrap().unwrap();
    robot.set_wall_distance(0.05);
    let near = ir.latest().unwrap().unwrap();
    assert!(near.front_left > far.front_left);
    assert!(near.front_left > 1800 && near.front_right > 1800);
    assert!(near.left < 1800 && near.right < 1800);
}

#[test]
fn range_refreshes_every_n_steps() {
    let robot = SimRobot::default();
    let mut enc = robot.encoders();
    let mut range = robot.range();
    range.latest_mm().unwrap();
    let mut fresh = 0;
    for _ in 0..100 {
        enc.read_counts().unwrap();
        if range.latest_mm().unwrap().is_some() {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 10);
}

#[test]
fn encoder_failures_are_counted_down() {
    let robot = SimRobot::default();
    let mut enc = robot.encoders();
    robot.fail_encoder_reads(2);
    for _ in 0..2 {
        let err = enc.read_counts().unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
    }
    assert!(enc.read_counts().is_ok());
    assert_eq!(robot.state().steps, 3);
}

#[test]
fn imu_spikes_and_silence() {
    let robot = SimRobot::default();
    let mut imu = robot.imu();
    robot.spike_imu(1);
    assert_eq!(imu.latest().unwrap().unwrap().gyro[2], 100.0);
    assert!(imu.latest().unwrap().unwrap().gyro[2] < 1.0);
    robot.silence_imu(2);
    assert!(imu.latest().unwrap().is_none());
    assert!(imu.latest().unwrap().is_none());
    assert!(imu.latest().unwrap().is_some());
}

#[test]
fn bridge_failure_keeps_previous_duty() {
    let robot = SimRobot::default();
    let mut bridge = robot.bridge();
    bridge.set_duty(0.2, 0.2).unwrap();
    robot.fail_bridge_writes(1);
    assert!(bridge.set_duty(0.9, 0.9).is_err());
    assert_eq!(robot.state().duty, [0.2, 0.2]);
    bridge.disable().unwrap();
    assert_eq!(robot.state().duty, [0.0, 0.0]);
}

#[test]
fn battery_sags_under_load_and_leds_latch() {
    let robot = SimRobot::default();
    let rest = robot.battery().volts().unwrap();
    drive(&robot, 1.0, 1.0, 1);
    let loaded = robot.battery().volts().unwrap();
    assert!(loaded < rest);

    robot.set_battery_v(6.0);
    robot.encoders().read_counts().unwrap();
    assert!(robot.battery().volts().unwrap() < 6.0);

    robot.leds().set(true, false).unwrap();
    assert_eq!(robot.state().leds, (true, false));
}
