//! Complementary heading filter over odometry and the z-axis gyro.
//!
//! The odometry heading is drift-free over the long run; the integrated gyro
//! responds within one tick. The blend is computed on the circle so that a
//! heading near ±π does not jump when the two sources straddle the cut.
//!
//! Samples outside the configured physical bounds are discarded: the output
//! falls back to the odometry pose for that tick and the fault counters move.
//! Position is never corrected from the IMU.

use rover_traits::ImuSample;

use crate::config::FusionCfg;
use crate::math::{angle_diff, normalize_angle};
use crate::types::{Pose, WheelState};

/// Outcome of one fusion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutput {
    pub pose: Pose,
    /// False when the sample was rejected as out of range.
    pub accepted: bool,
}

/// Roll and pitch estimate from accelerometer leveling, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone)]
pub struct InertialFusion {
    cfg: FusionCfg,
    heading: f32,
    bias_z: f32,
    attitude: Attitude,
    fault_count: u32,
    consecutive_faults: u32,
}

impl InertialFusion {
    pub fn new(cfg: FusionCfg) -> Self {
        Self {
            bias_z: if cfg.gyro_bias_z.is_finite() {
                cfg.gyro_bias_z
            } else {
                0.0
            },
            cfg,
            heading: 0.0,
            attitude: Attitude::default(),
            fault_count: 0,
            consecutive_faults: 0,
        }
    }

    /// Re-seed the filter at `heading`. Learned bias is kept.
    pub fn reset(&mut self, heading: f32) {
        self.heading = normalize_angle(heading);
        self.consecutive_faults = 0;
    }

    /// Both wheels decoded this tick and turning slower than the stationary limit.
    pub fn is_stationary(&self, wheels: &[WheelState; 2]) -> bool {
        wheels
            .iter()
            .all(|w| !w.stale && w.angular_velocity.abs() < self.cfg.stationary_rad_s)
    }

    /// True when every value is finite and within the configured bounds.
    pub fn in_bounds(&self, sample: &ImuSample) -> bool {
        let finite = sample
            .gyro
            .iter()
            .chain(sample.accel.iter())
            .all(|v| v.is_finite());
        if !finite {
            return false;
        }
        let gyro_ok = sample
            .gyro
            .iter()
            .all(|g| g.abs() <= self.cfg.max_gyro_rad_s);
        let [ax, ay, az] = sample.accel;
        let accel_norm = (ax * ax + ay * ay + az * az).sqrt();
        gyro_ok && accel_norm <= self.cfg.max_accel_m_s2
    }

    /// Blend the odometry pose for this tick with one IMU sample.
    ///
    /// `odom` must have been integrated from the previous fused pose.
    /// `stationary` is true when both wheels are at rest; the filter then
    /// follows odometry and learns the gyro bias.
    pub fn fuse(
        &mut self,
        odom: Pose,
        sample: &ImuSample,
        dt: f32,
        stationary: bool,
    ) -> FusionOutput {
        if !self.in_bounds(sample) {
            self.fault_count = self.fault_count.saturating_add(1);
            self.consecutive_faults = self.consecutive_faults.saturating_add(1);
            tracing::debug!(
                gyro = ?sample.gyro,
                accel = ?sample.accel,
                faults = self.fault_count,
                "imu sample rejected"
            );
            return FusionOutput {
                pose: self.hold(odom),
                accepted: false,
            };
        }
        self.consecutive_faults = 0;

        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.level(sample, dt);

        let gz = sample.gyro[2];
        if stationary {
            if self.cfg.bias_learn_rate > 0.0 {
                self.bias_z += self.cfg.bias_learn_rate * (gz - self.bias_z);
            }
            self.heading = odom.heading;
            return FusionOutput {
                pose: odom,
                accepted: true,
            };
        }

        let rate = gz - self.bias_z;
        let alpha = self.cfg.alpha;
        let gyro_heading = self.heading + rate * dt;
        let heading =
            normalize_angle(gyro_heading + alpha * angle_diff(odom.heading, gyro_heading));
        self.heading = heading;

        FusionOutput {
            pose: Pose {
                heading,
                angular_velocity: alpha * odom.angular_velocity + (1.0 - alpha) * rate,
                ..odom
            },
            accepted: true,
        }
    }

    /// No usable sample this tick: carry the odometry pose through.
    pub fn hold(&mut self, odom: Pose) -> Pose {
        self.heading = odom.heading;
        odom
    }

    fn level(&mut self, sample: &ImuSample, dt: f32) {
        let gain = self.cfg.level_gain;
        if gain <= 0.0 {
            return;
        }
        let [ax, ay, az] = sample.accel;
        let horiz = (ay * ay + az * az).sqrt();
        if horiz < f32::EPSILON {
            return;
        }
        let roll_acc = ay.atan2(az);
        let pitch_acc = (-ax).atan2(horiz);
        let roll = self.attitude.roll + sample.gyro[0] * dt;
        let pitch = self.attitude.pitch + sample.gyro[1] * dt;
        self.attitude.roll = normalize_angle(roll + gain * angle_diff(roll_acc, roll));
        self.attitude.pitch = normalize_angle(pitch + gain * angle_diff(pitch_acc, pitch));
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    /// Current z-axis gyro bias estimate (rad/s).
    pub fn bias_z(&self) -> f32 {
        self.bias_z
    }

    pub fn attitude(&self) -> Attitude {
        self.attitude
    }

    /// Total rejected samples since construction.
    pub fn fault_count(&self) -> u32 {
        self.fault_count
    }

    /// Rejected samples since the last accepted one.
    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }
}
