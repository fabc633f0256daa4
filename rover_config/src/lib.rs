#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(
        clippy::all,
        clippy::pedantic,
        clippy::nursery,
        clippy::unwrap_used,
        clippy::expect_used
    )
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and replay-trace parsing for the rover motion core.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Replay traces are CSV files with a strict header, one row per tick.
//! - `PersistedImuCalibration` round-trips through TOML so a stationary gyro
//!   bias estimate survives restarts.
use serde::{Deserialize, Serialize};

/// Replay trace CSV schema.
///
/// Expected headers:
/// t_us,left_count,right_count,gyro_x,gyro_y,gyro_z,accel_x,accel_y,accel_z,imu_fresh,ir_fl,ir_fr,ir_l,ir_r,tof_mm,stop,target_left,target_right
///
/// `tof_mm` may be empty when the ranging sensor had no new result that tick.
/// `imu_fresh` and `stop` are 0 or 1.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub t_us: u64,
    pub left_count: u32,
    pub right_count: u32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub imu_fresh: u8,
    pub ir_fl: u16,
    pub ir_fr: u16,
    pub ir_l: u16,
    pub ir_r: u16,
    pub tof_mm: Option<u16>,
    pub stop: u8,
    pub target_left: f32,
    pub target_right: f32,
}

pub const TRACE_HEADERS: [&str; 18] = [
    "t_us",
    "left_count",
    "right_count",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "accel_x",
    "accel_y",
    "accel_z",
    "imu_fresh",
    "ir_fl",
    "ir_fr",
    "ir_l",
    "ir_r",
    "tof_mm",
    "stop",
    "target_left",
    "target_right",
];

/// Chassis geometry. No defaults: a wrong wheelbase silently skews every turn.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DriveCfg {
    pub wheel_radius_m: f32,
    pub wheelbase_m: f32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct EncoderCfg {
    /// Quadrature counts per motor shaft revolution (after x4 decoding).
    pub counts_per_rev: u32,
    /// Motor revolutions per wheel revolution.
    pub gear_ratio: f32,
    /// Hardware counter width: 16 or 32.
    #[serde(default = "default_counter_bits")]
    pub counter_bits: u8,
    #[serde(default)]
    pub invert_left: bool,
    #[serde(default)]
    pub invert_right: bool,
}

fn default_counter_bits() -> u8 {
    16
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ControlCfg {
    /// Fixed control loop rate.
    pub rate_hz: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { rate_hz: 500 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric clamp on the accumulated integral (error·s).
    pub integral_limit: f32,
    /// Symmetric clamp on the duty output, at most 1.0.
    pub duty_limit: f32,
    /// Derivative low-pass weight in (0, 1]; 1.0 disables filtering.
    pub derivative_alpha: f32,
}

impl Default for PidCfg {
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FusionCfg {
    /// Weight of the odometry heading in [0, 1]; the gyro gets the rest.
    pub alpha: f32,
    /// Reject samples with any gyro axis above this (rad/s).
    pub max_gyro_rad_s: f32,
    /// Reject samples whose acceleration magnitude exceeds this (m/s²).
    pub max_accel_m_s2: f32,
    /// Initial z-axis gyro bias (rad/s).
    pub gyro_bias_z: f32,
    /// EMA weight for bias learning while stationary; 0 disables.
    pub bias_learn_rate: f32,
    /// Both wheels below this (rad/s) counts as stationary.
    pub stationary_rad_s: f32,
    /// Accelerometer weight for roll/pitch leveling; 0 disables.
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

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IrChannel {
    FrontLeft,
    FrontRight,
    Left,
    Right,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProximityCfg {
    /// Intensity above which a front IR channel sees an obstacle.
    pub front_threshold: u16,
    /// Intensity above which a side IR channel sees an obstacle.
    pub side_threshold: u16,
    /// Floor-facing channels reading below this see a line or an edge.
    pub line_threshold: u16,
    /// Channels mounted facing the floor. They are excluded from obstacle checks.
    pub floor_channels: Vec<IrChannel>,
    /// ToF range below which the robot must stop (mm).
    pub critical_range_mm: u16,
    /// Consecutive released ticks before leaving a hazard state.
    pub release_ticks: u16,
    /// Target scale applied under side or line hazards, in [0, 1].
    pub reduced_speed_ratio: f32,
}

impl Default for ProximityCfg {
    fn default() -> Self {
        Self {
            front_threshold: 1800,
            side_threshold: 1800,
            line_threshold: 400,
            floor_channels: Vec::new(),
            critical_range_mm: 60,
            release_ticks: 3,
            reduced_speed_ratio: 0.3,
        }
    }
}

/// Freshness windows per sensor. A sensor silent for longer is stale.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Safety {
    /// Consecutive faulted ticks before the loop latches `Faulted`.
    pub fault_limit_ticks: u32,
    /// Consecutive overruns before the loop latches `Faulted`.
    pub overrun_limit: u32,
    /// Consecutive asserted samples of the stop line before it counts.
    pub stop_debounce_n: u8,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            fault_limit_ticks: 25,
            overrun_limit: 5,
            stop_debounce_n: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct BatteryCfg {
    pub enabled: bool,
    /// Log a warning below this pack voltage.
    pub warn_v: f32,
    /// Force zero targets below this pack voltage.
    pub critical_v: f32,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_v: 7.0,
            critical_v: 6.4,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Every sensor is polled inside the tick.
    #[default]
    Direct,
    /// The ToF sensor is read on a background thread at `range_hz`.
    Sampled,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RunnerCfg {
    pub mode: RunMode,
    /// Ranging rate used in sampled mode.
    pub range_hz: u32,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            mode: RunMode::Direct,
            range_hz: 50,
        }
    }
}

/// Plant parameters for the simulated robot.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SimCfg {
    /// First-order motor time constant (s).
    pub motor_tau_s: f32,
    /// Wheel speed at full duty (rad/s).
    pub max_wheel_rad_s: f32,
    /// Distance to the wall straight ahead at start (m).
    pub wall_distance_m: f32,
    /// Constant gyro z bias injected by the simulated IMU (rad/s).
    pub gyro_bias_z: f32,
    /// Pack voltage at rest.
    pub battery_v: f32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            motor_tau_s: 0.05,
            max_wheel_rad_s: 40.0,
            wall_distance_m: 1.5,
            gyro_bias_z: 0.002,
            battery_v: 8.2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub drive: DriveCfg,
    pub encoder: EncoderCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub pid: PidCfg,
    #[serde(default)]
    pub fusion: FusionCfg,
    #[serde(default)]
    pub proximity: ProximityCfg,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub battery: BatteryCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub sim: SimCfg,
    /// Optional persisted gyro calibration; overrides `fusion.gyro_bias_z` when present.
    #[serde(default)]
    pub calibration: Option<PersistedImuCalibration>,
}

/// Stationary gyro bias estimate, written by `calibrate-gyro`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PersistedImuCalibration {
    /// Mean angular rate at rest per axis (rad/s).
    pub gyro_bias: [f32; 3],
    /// Number of samples averaged.
    #[serde(default)]
    pub samples: u32,
}

impl PersistedImuCalibration {
    /// Average stationary gyro samples into a bias estimate.
    pub fn from_samples(samples: &[[f32; 3]]) -> eyre::Result<Self> {
        if samples.is_empty() {
            eyre::bail!("gyro calibration requires at least one sample");
        }
        let mut sum = [0.0f64; 3];
        for s in samples {
            for (acc, v) in sum.iter_mut().zip(s) {
                if !v.is_finite() {
                    eyre::bail!("gyro calibration sample is not finite");
                }
                *acc += f64::from(*v);
            }
        }
        let n = samples.len() as f64;
        Ok(Self {
            gyro_bias: sum.map(|s| (s / n) as f32),
            samples: u32::try_from(samples.len()).unwrap_or(u32::MAX),
        })
    }

    /// Serialize as a standalone `[calibration]` TOML table.
    pub fn to_toml(&self) -> eyre::Result<String> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            calibration: &'a PersistedImuCalibration,
        }
        toml::to_string(&Wrapper { calibration: self })
            .map_err(|e| eyre::eyre!("serialize gyro calibration: {e}"))
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a replay trace, enforcing the exact header row.
pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != TRACE_HEADERS {
        eyre::bail!(
            "trace CSV must have headers '{}', got: {}",
            TRACE_HEADERS.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    let mut prev_t: Option<u64> = None;
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = match rec {
            Ok(row) => row,
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        };
        if row.imu_fresh > 1 || row.stop > 1 {
            eyre::bail!("invalid CSV row {}: imu_fresh and stop must be 0 or 1", idx + 2);
        }
        if let Some(p) = prev_t
            && row.t_us <= p
        {
            eyre::bail!(
                "invalid CSV row {}: t_us must be strictly increasing ({} after {})",
                idx + 2,
                row.t_us,
                p
            );
        }
        prev_t = Some(row.t_us);
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV {:?} has no rows", path);
    }
    Ok(rows)
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

fn unit_interval(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

impl Config {
    /// Effective z-axis gyro bias: the persisted calibration wins over `[fusion]`.
    pub fn gyro_bias_z(&self) -> f32 {
        self.calibration
            .map_or(self.fusion.gyro_bias_z, |c| c.gyro_bias[2])
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Drive
        if !(self.drive.wheel_radius_m > 0.0 && self.drive.wheel_radius_m <= 1.0) {
            eyre::bail!("drive.wheel_radius_m must be in (0.0, 1.0]");
        }
        if !(self.drive.wheelbase_m > 0.0 && self.drive.wheelbase_m <= 5.0) {
            eyre::bail!("drive.wheelbase_m must be in (0.0, 5.0]");
        }

        // Encoder
        if self.encoder.counts_per_rev == 0 {
            eyre::bail!("encoder.counts_per_rev must be > 0");
        }
        if !(self.encoder.gear_ratio.is_finite() && self.encoder.gear_ratio > 0.0) {
            eyre::bail!("encoder.gear_ratio must be > 0");
        }
        if !matches!(self.encoder.counter_bits, 16 | 32) {
            eyre::bail!("encoder.counter_bits must be 16 or 32");
        }

        // Control
        if self.control.rate_hz == 0 {
            eyre::bail!("control.rate_hz must be > 0");
        }
        if self.control.rate_hz > 10_000 {
            eyre::bail!("control.rate_hz is unreasonably high (>10 kHz)");
        }

        // PID
        for (name, v) in [
            ("kp", self.pid.kp),
            ("ki", self.pid.ki),
            ("kd", self.pid.kd),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("pid.{name} must be finite and >= 0");
            }
        }
        if !(self.pid.integral_limit.is_finite() && self.pid.integral_limit >= 0.0) {
            eyre::bail!("pid.integral_limit must be >= 0");
        }
        if !(self.pid.duty_limit > 0.0 && self.pid.duty_limit <= 1.0) {
            eyre::bail!("pid.duty_limit must be in (0.0, 1.0]");
        }
        if !(self.pid.derivative_alpha > 0.0 && self.pid.derivative_alpha <= 1.0) {
            eyre::bail!("pid.derivative_alpha must be in (0.0, 1.0]");
        }

        // Fusion
        if !unit_interval(self.fusion.alpha) {
            eyre::bail!("fusion.alpha must be in [0.0, 1.0]");
        }
        if !positive(self.fusion.max_gyro_rad_s) {
            eyre::bail!("fusion.max_gyro_rad_s must be > 0");
        }
        if !positive(self.fusion.max_accel_m_s2) {
            eyre::bail!("fusion.max_accel_m_s2 must be > 0");
        }
        if !self.fusion.gyro_bias_z.is_finite() {
            eyre::bail!("fusion.gyro_bias_z must be finite");
        }
        if !unit_interval(self.fusion.bias_learn_rate) {
            eyre::bail!("fusion.bias_learn_rate must be in [0.0, 1.0]");
        }
        if !(self.fusion.stationary_rad_s.is_finite() && self.fusion.stationary_rad_s >= 0.0) {
            eyre::bail!("fusion.stationary_rad_s must be >= 0");
        }
        if !unit_interval(self.fusion.level_gain) {
            eyre::bail!("fusion.level_gain must be in [0.0, 1.0]");
        }

        // Proximity
        if self.proximity.release_ticks == 0 {
            eyre::bail!("proximity.release_ticks must be >= 1");
        }
        if !unit_interval(self.proximity.reduced_speed_ratio) {
            eyre::bail!("proximity.reduced_speed_ratio must be in [0.0, 1.0]");
        }
        for (i, ch) in self.proximity.floor_channels.iter().enumerate() {
            if self.proximity.floor_channels[..i].contains(ch) {
                eyre::bail!("proximity.floor_channels lists {ch:?} twice");
            }
        }

        // Timeouts
        for (name, v) in [
            ("encoder_ms", self.timeouts.encoder_ms),
            ("imu_ms", self.timeouts.imu_ms),
            ("range_ms", self.timeouts.range_ms),
            ("ir_ms", self.timeouts.ir_ms),
        ] {
            if v == 0 {
                eyre::bail!("timeouts.{name} must be >= 1");
            }
            if v > 60_000 {
                eyre::bail!("timeouts.{name} is unreasonably large (>60s)");
            }
        }

        // Safety
        if self.safety.fault_limit_ticks == 0 {
            eyre::bail!("safety.fault_limit_ticks must be >= 1");
        }
        if self.safety.overrun_limit == 0 {
            eyre::bail!("safety.overrun_limit must be >= 1");
        }
        if self.safety.stop_debounce_n == 0 {
            eyre::bail!("safety.stop_debounce_n must be >= 1");
        }

        // Battery
        if self.battery.enabled {
            if !positive(self.battery.critical_v) {
                eyre::bail!("battery.critical_v must be > 0");
            }
            if self.battery.warn_v < self.battery.critical_v {
                eyre::bail!("battery.warn_v must be >= battery.critical_v");
            }
        }

        // Runner
        if self.runner.range_hz == 0 {
            eyre::bail!("runner.range_hz must be > 0");
        }

        // Sim
        if !positive(self.sim.motor_tau_s) {
            eyre::bail!("sim.motor_tau_s must be > 0");
        }
        if !positive(self.sim.max_wheel_rad_s) {
            eyre::bail!("sim.max_wheel_rad_s must be > 0");
        }

        // Calibration
        if let Some(c) = &self.calibration
            && c.gyro_bias.iter().any(|v| !v.is_finite())
        {
            eyre::bail!("calibration.gyro_bias must be finite");
        }

        Ok(())
    }
}
