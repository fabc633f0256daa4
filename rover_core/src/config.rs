//! Configuration types for the motion core.
//!
//! These are the runtime configuration structs used by `Rover`.
//! They are separate from the TOML-deserialized config in `rover_config`.

/// Chassis geometry for a differential drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    /// Wheel radius in meters.
    pub wheel_radius_m: f32,
    /// Distance between wheel contact points in meters.
    pub wheelbase_m: f32,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_radius_m: 0.016,
            wheelbase_m: 0.15,
        }
    }
}

/// Quadrature decoding parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderCfg {
    /// Counts per motor revolution after x4 decoding.
    pub counts_per_rev: u32,
    /// Motor revolutions per wheel revolution.
    pub gear_ratio: f32,
    /// Width of the hardware counter, 16 or 32.
    pub counter_bits: u8,
    /// Negate the left delta (mirrored motor mounting).
    pub invert_left: bool,
    /// Negate the right delta.
    pub invert_right: bool,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            counts_per_rev: 48,
            gear_ratio: 30.0,
            counter_bits: 16,
            invert_left: false,
            invert_right: false,
        }
    }
}

/// Gains and limits for one wheel velocity loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric clamp on the integral accumulator (error·s).
    pub integral_limit: f32,
    /// Symmetric duty clamp in (0, 1].
    pub duty_limit: f32,
    /// Derivative low-pass weight in (0, 1]; 1.0 passes the raw derivative.
    pub derivative_alpha: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.08,
            ki: 0.6,
            kd: 0.0,
            integral_limit: 1.5,
            duty_limit: 1.0,
            derivative_alpha: 1.0,
        }
    }
}

/// Complementary heading filter and IMU sanity bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionCfg {
    /// Weight of the odometry heading; `1 - alpha` goes to the gyro.
    pub alpha: f32,
    pub max_gyro_rad_s: f32,
    pub max_accel_m_s2: f32,
    /// Starting z-axis gyro bias (rad/s).
    pub gyro_bias_z: f32,
    /// EMA weight for stationary bias learning; 0 disables.
    pub bias_learn_rate: f32,
    /// Both wheels slower than this (rad/s) counts as stationary.
    pub stationary_rad_s: f32,
    /// Accelerometer weight for roll/pitch; 0 disables leveling.
    pub level_gain: f32,
}

impl Default for FusionCfg {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            max_gyro_rad_s: 34.9,
            max_accel_m_s2: 156.9,
            gyro_bias_z: 0.0,
            bias_learn_rate: 0.005,
            stationary_rad_s: 0.05,
            level_gain: 0.02,
        }
    }
}

/// IR/ToF hazard thresholds.
///
/// Channel order everywhere is front-left, front-right, left, right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityCfg {
    pub front_threshold: u16,
    pub side_threshold: u16,
    pub line_threshold: u16,
    /// Floor-facing channels; excluded from obstacle checks.
    pub floor_mask: [bool; 4],
    pub critical_range_mm: u16,
    /// Consecutive released ticks needed to leave a hazard.
    pub release_ticks: u16,
    /// Target scale under `SideObstacle` / `LineBoundary`.
    pub reduced_speed_ratio: f32,
}

impl Default for ProximityCfg {
    fn default() -> Self {
        Self {
            front_threshold: 1800,
            side_threshold: 1800,
            line_threshold: 400,
            floor_mask: [false; 4],
            critical_range_mm: 60,
            release_ticks: 3,
            reduced_speed_ratio: 0.3,
        }
    }
}

/// Freshness windows. Converted to whole ticks at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub encoder_ms: u64,
    pub imu_ms: u64,
    pub range_ms: u64,
    pub ir_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            encoder_ms: 5,
            imu_ms: 10,
            range_ms: 120,
            ir_ms: 20,
        }
    }
}

/// Fault escalation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyCfg {
    /// Consecutive ticks with any active fault flag before latching `Faulted`.
    pub fault_limit_ticks: u32,
    /// Consecutive overrunning ticks before latching `Faulted`.
    pub overrun_limit: u32,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            fault_limit_ticks: 25,
            overrun_limit: 5,
        }
    }
}

/// Battery thresholds. Absent from the builder means no monitoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryCfg {
    pub warn_v: f32,
    pub critical_v: f32,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            warn_v: 7.0,
            critical_v: 6.4,
        }
    }
}
