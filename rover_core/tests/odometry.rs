use std::f32::consts::PI;

use proptest::prelude::*;
use rover_core::odometry::body_velocity;
use rover_core::{DriveGeometry, Pose, Side, WheelState, integrate};

fn wheels(left: f32, right: f32) -> [WheelState; 2] {
    let mut l = WheelState::new(Side::Left);
    let mut r = WheelState::new(Side::Right);
    l.angular_velocity = left;
    r.angular_velocity = right;
    l.stale = false;
    r.stale = false;
    [l, r]
}

#[test]
fn equal_wheels_drive_straight_along_heading() {
    let geometry = DriveGeometry {
        wheel_radius_m: 0.016,
        wheelbase_m: 0.15,
    };
    let start = Pose::at(0.2, -0.1, 0.7);
    let w = wheels(1.0, 1.0);
    let (v, omega) = body_velocity(&w, &geometry);
    assert_eq!(omega, 0.0);
    assert!((v - 0.016).abs() < 1e-7);

    let p = integrate(start, &w, 0.01, &geometry);
    assert_eq!(p.heading, start.heading);
    assert_eq!(p.angular_velocity, 0.0);
    let (dx, dy) = (p.x - start.x, p.y - start.y);
    assert!((dx - 0.016 * 0.01 * 0.7_f32.cos()).abs() < 1e-7);
    assert!((dy - 0.016 * 0.01 * 0.7_f32.sin()).abs() < 1e-7);
}

#[test]
fn quarter_turn_in_place() {
    let g = DriveGeometry::default();
    // ω = r·(ωr − ωl)/b; pick wheel speeds for π/2 rad/s.
    let ws = (PI / 2.0) * g.wheelbase_m / (2.0 * g.wheel_radius_m);
    let mut pose = Pose::default();
    for _ in 0..100 {
        pose = integrate(pose, &wheels(-ws, ws), 0.01, &g);
    }
    assert!((pose.heading - PI / 2.0).abs() < 1e-4);
    assert!(pose.x.abs() < 1e-6 && pose.y.abs() < 1e-6);
}

proptest! {
    #[test]
    fn heading_stays_in_half_open_range(
        start in -PI..PI,
        left in -60.0f32..60.0,
        right in -60.0f32..60.0,
        dt in 0.0001f32..0.1,
        steps in 1usize..200,
    ) {
        let g = DriveGeometry::default();
        let mut pose = Pose::at(0.0, 0.0, start);
        for _ in 0..steps {
            pose = integrate(pose, &wheels(left, right), dt, &g);
            prop_assert!(pose.heading > -PI && pose.heading <= PI, "heading {}", pose.heading);
        }
    }

    #[test]
    fn zero_velocity_is_idempotent(
        x in -100.0f32..100.0,
        y in -100.0f32..100.0,
        heading in -PI..PI,
        dt in 0.0001f32..1.0,
    ) {
        let g = DriveGeometry::default();
        let start = Pose::at(x, y, heading);
        let p = integrate(start, &wheels(0.0, 0.0), dt, &g);
        prop_assert_eq!(p.x.to_bits(), start.x.to_bits());
        prop_assert_eq!(p.y.to_bits(), start.y.to_bits());
        prop_assert_eq!(p.heading.to_bits(), start.heading.to_bits());
    }
}
