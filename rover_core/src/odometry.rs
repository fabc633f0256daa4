//! Differential-drive dead reckoning.

use crate::config::DriveGeometry;
use crate::math::normalize_angle;
use crate::types::{Pose, WheelState};

/// Body velocities `(v, ω)` implied by the two wheel speeds.
#[inline]
pub fn body_velocity(wheels: &[WheelState; 2], geometry: &DriveGeometry) -> (f32, f32) {
    let v_left = wheels[0].angular_velocity * geometry.wheel_radius_m;
    let v_right = wheels[1].angular_velocity * geometry.wheel_radius_m;
    let linear = 0.5 * (v_left + v_right);
    let angular = if geometry.wheelbase_m > 0.0 {
        (v_right - v_left) / geometry.wheelbase_m
    } else {
        0.0
    };
    (linear, angular)
}

/// Advance `pose` by one midpoint step of length `dt`.
///
/// A zero, negative or non-finite `dt` returns the pose unchanged. With both
/// wheels at rest the position and heading come back bit-identical; only the
/// reported velocities are refreshed.
pub fn integrate(
    pose: Pose,
    wheels: &[WheelState; 2],
    dt: f32,
    geometry: &DriveGeometry,
) -> Pose {
    if !(dt.is_finite() && dt > 0.0) {
        return pose;
    }
    let (linear, angular) = body_velocity(wheels, geometry);
    let mut next = Pose {
        linear_velocity: linear,
        angular_velocity: angular,
        ..pose
    };
    if linear == 0.0 && angular == 0.0 {
        return next;
    }

    let mid = pose.heading + 0.5 * angular * dt;
    let (sin_mid, cos_mid) = mid.sin_cos();
    next.x += linear * cos_mid * dt;
    next.y += linear * sin_mid * dt;
    next.heading = normalize_angle(pose.heading + angular * dt);
    next
}
