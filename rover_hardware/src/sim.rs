//! Deterministic simulated robot.
//!
//! One shared plant advances by a fixed step every time the encoders are read,
//! which the control loop does exactly once per tick. Each collaborator handle
//! is a cheap clone of the shared plant, so the same robot can be split across
//! the builder and a background sampler.
//!
//! The model is deliberately small: first-order wheel response to duty, a
//! wall perpendicular to the x axis that feeds the ToF and the front IR pair,
//! a constant floor return on the side channels, a biased gyro and a battery
//! that sags with load.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rover_traits::{
    BatteryMonitor, Encoders, HwResult, Imu, ImuSample, IrArray, IrReading, MotorBridge,
    RangeSensor, RawCounts, StatusLeds,
};

use crate::error::HwError;

const GRAVITY: f32 = 9.81;
/// IR return ∝ 1/distance; tuned so a wall at 10 cm reads ~1900.
const IR_GAIN: f32 = 228.0;
const IR_OFFSET_M: f32 = 0.02;
const IR_MAX: f32 = 4095.0;
const FLOOR_RETURN: u16 = 900;
const TOF_MAX_MM: f32 = 4000.0;
const BATTERY_SAG_V: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Plant step per encoder read, in seconds.
    pub dt_s: f32,
    pub wheel_radius_m: f32,
    pub wheelbase_m: f32,
    /// Encoder counts per wheel revolution (after gearing).
    pub counts_per_wheel_rev: f32,
    pub counter_bits: u8,
    /// Wheel speed time constant.
    pub motor_tau_s: f32,
    /// Wheel speed at full duty.
    pub max_wheel_rad_s: f32,
    /// Distance from the start pose to the wall ahead.
    pub wall_distance_m: f32,
    pub gyro_bias_z: f32,
    /// Resting pack voltage.
    pub battery_v: f32,
    /// ToF delivers a new range every this many plant steps.
    pub range_every: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            dt_s: 0.002,
            wheel_radius_m: 0.016,
            wheelbase_m: 0.15,
            counts_per_wheel_rev: 1440.0,
            counter_bits: 16,
            motor_tau_s: 0.05,
            max_wheel_rad_s: 40.0,
            wall_distance_m: 1.5,
            gyro_bias_z: 0.002,
            battery_v: 8.2,
            range_every: 10,
        }
    }
}

/// Ground truth, for tests and the CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimState {
    pub t_us: u64,
    pub steps: u64,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub wheel_rad_s: [f32; 2],
    pub duty: [f32; 2],
    pub motors_enabled: bool,
    pub leds: (bool, bool),
    pub battery_v: f32,
}

#[derive(Debug, Default)]
struct Faults {
    encoder_timeouts: u32,
    imu_spikes: u32,
    imu_silent: u32,
    bridge_failures: u32,
}

#[derive(Debug)]
struct Plant {
    p: SimParams,
    state: SimState,
    counts: [f64; 2],
    faults: Faults,
    range_ready: bool,
}

impl Plant {
    fn step(&mut self) {
        let p = self.p;
        let dt = p.dt_s;
        let s = &mut self.state;
        let k = if p.motor_tau_s > 0.0 {
            (dt / p.motor_tau_s).min(1.0)
        } else {
            1.0
        };
        let counts_per_rad = f64::from(p.counts_per_wheel_rev) / std::f64::consts::TAU;
        for i in 0..2 {
            let target = if s.motors_enabled {
                s.duty[i].clamp(-1.0, 1.0) * p.max_wheel_rad_s
            } else {
                0.0
            };
            s.wheel_rad_s[i] += (target - s.wheel_rad_s[i]) * k;
            self.counts[i] += f64::from(s.wheel_rad_s[i] * dt) * counts_per_rad;
        }

        let v_l = s.wheel_rad_s[0] * p.wheel_radius_m;
        let v_r = s.wheel_rad_s[1] * p.wheel_radius_m;
        let v = 0.5 * (v_l + v_r);
        let w = (v_r - v_l) / p.wheelbase_m;
        let mid = s.heading + 0.5 * w * dt;
        s.x += v * mid.cos() * dt;
        s.y += v * mid.sin() * dt;
        s.heading = wrap(s.heading + w * dt);

        let load = if s.motors_enabled {
            0.5 * (s.duty[0].abs() + s.duty[1].abs())
        } else {
            0.0
        };
        s.battery_v = p.battery_v - BATTERY_SAG_V * load;

        s.steps += 1;
        s.t_us += (f64::from(dt) * 1e6).round() as u64;
        self.range_ready = p.range_every <= 1 || s.steps % u64::from(p.range_every) == 0;
    }

    fn counter(&self, i: usize) -> u32 {
        let bits = u32::from(self.p.counter_bits.clamp(1, 32));
        let modulus = 1i64 << bits;
        (self.counts[i].floor() as i64).rem_euclid(modulus) as u32
    }

    /// Distance to the wall along the current heading, if it is ahead.
    fn wall_range_m(&self) -> Option<f32> {
        let gap = self.p.wall_distance_m - self.state.x;
        let c = self.state.heading.cos();
        if c < 0.1 {
            return None;
        }
        Some((gap / c).max(0.0))
    }

    fn gyro_z(&self) -> f32 {
        let s = &self.state;
        let w = (s.wheel_rad_s[1] - s.wheel_rad_s[0]) * self.p.wheel_radius_m / self.p.wheelbase_m;
        w + self.p.gyro_bias_z
    }
}

fn wrap(a: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let r = (a + PI).rem_euclid(TAU) - PI;
    if r <= -PI { PI } else { r }
}

/// Shared simulated robot. Clone freely; all clones drive the same plant.
#[derive(Debug, Clone)]
pub struct SimRobot {
    plant: Arc<Mutex<Plant>>,
}

impl SimRobot {
    pub fn new(params: SimParams) -> Self {
        Self {
            plant: Arc::new(Mutex::new(Plant {
                state: SimState {
                    battery_v: params.battery_v,
                    ..SimState::default()
                },
                p: params,
                counts: [0.0; 2],
                faults: Faults::default(),
                range_ready: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Plant> {
        self.plant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SimState {
        self.lock().state
    }

    pub fn params(&self) -> SimParams {
        self.lock().p
    }

    /// Move the wall; distances are measured from the start pose.
    pub fn set_wall_distance(&self, m: f32) {
        self.lock().p.wall_distance_m = m;
    }

    pub fn set_battery_v(&self, v: f32) {
        self.lock().p.battery_v = v;
    }

    /// The next `n` encoder reads time out (the plant still advances).
    pub fn fail_encoder_reads(&self, n: u32) {
        self.lock().faults.encoder_timeouts = n;
    }

    /// The next `n` IMU samples report an impossible angular rate.
    pub fn spike_imu(&self, n: u32) {
        self.lock().faults.imu_spikes = n;
    }

    /// The IMU delivers nothing new for the next `n` polls.
    pub fn silence_imu(&self, n: u32) {
        self.lock().faults.imu_silent = n;
    }

    /// The next `n` duty writes fail.
    pub fn fail_bridge_writes(&self, n: u32) {
        self.lock().faults.bridge_failures = n;
    }

    pub fn encoders(&self) -> SimEncoders {
        SimEncoders(self.clone())
    }
    pub fn imu(&self) -> SimImu {
        SimImu(self.clone())
    }
    pub fn range(&self) -> SimRange {
        SimRange(self.clone())
    }
    pub fn ir(&self) -> SimIr {
        SimIr(self.clone())
    }
    pub fn bridge(&self) -> SimBridge {
        SimBridge(self.clone())
    }
    pub fn leds(&self) -> SimLeds {
        SimLeds(self.clone())
    }
    pub fn battery(&self) -> SimBattery {
        SimBattery(self.clone())
    }
}

impl Default for SimRobot {
    fn default() -> Self {
        Self::new(SimParams::default())
    }
}

#[derive(Debug, Clone)]
pub struct SimEncoders(SimRobot);
#[derive(Debug, Clone)]
pub struct SimImu(SimRobot);
#[derive(Debug, Clone)]
pub struct SimRange(SimRobot);
#[derive(Debug, Clone)]
pub struct SimIr(SimRobot);
#[derive(Debug, Clone)]
pub struct SimBridge(SimRobot);
#[derive(Debug, Clone)]
pub struct SimLeds(SimRobot);
#[derive(Debug, Clone)]
pub struct SimBattery(SimRobot);

impl Encoders for SimEncoders {
    fn read_counts(&mut self) -> HwResult<RawCounts> {
        let mut plant = self.0.lock();
        plant.step();
        if plant.faults.encoder_timeouts > 0 {
            plant.faults.encoder_timeouts -= 1;
            return Err(Box::new(HwError::Timeout));
        }
        Ok(RawCounts {
            left: plant.counter(0),
            right: plant.counter(1),
        })
    }
}

impl Imu for SimImu {
    fn latest(&mut self) -> HwResult<Option<ImuSample>> {
        let mut plant = self.0.lock();
        if plant.faults.imu_silent > 0 {
            plant.faults.imu_silent -= 1;
            return Ok(None);
        }
        let mut gz = plant.gyro_z();
        if plant.faults.imu_spikes > 0 {
            plant.faults.imu_spikes -= 1;
            gz = 100.0;
        }
        Ok(Some(ImuSample {
            gyro: [0.0, 0.0, gz],
            accel: [0.0, 0.0, GRAVITY],
            timestamp_us: plant.state.t_us,
        }))
    }
}

impl RangeSensor for SimRange {
    fn latest_mm(&mut self) -> HwResult<Option<u16>> {
        let mut plant = self.0.lock();
        if !plant.range_ready {
            return Ok(None);
        }
        plant.range_ready = false;
        let mm = plant
            .wall_range_m()
            .map_or(TOF_MAX_MM, |m| (m * 1000.0).min(TOF_MAX_MM));
        Ok(Some(mm.round() as u16))
    }
}

impl IrArray for SimIr {
    fn latest(&mut self) -> HwResult<Option<IrReading>> {
        let plant = self.0.lock();
        let front = plant
            .wall_range_m()
            .map_or(0.0, |m| (IR_GAIN / (m + IR_OFFSET_M)).min(IR_MAX));
        let front = front.round() as u16;
        Ok(Some(IrReading {
            front_left: front,
            front_right: front,
            left: FLOOR_RETURN,
            right: FLOOR_RETURN,
        }))
    }
}

impl MotorBridge for SimBridge {
    fn set_duty(&mut self, left: f32, right: f32) -> HwResult<()> {
        let mut plant = self.0.lock();
        if plant.faults.bridge_failures > 0 {
            plant.faults.bridge_failures -= 1;
            return Err(Box::new(HwError::Bus("pwm write rejected".into())));
        }
        plant.state.duty = [left, right];
        Ok(())
    }

    fn enable(&mut self) -> HwResult<()> {
        self.0.lock().state.motors_enabled = true;
        tracing::debug!("sim MOTORS_EN high");
        Ok(())
    }

    fn disable(&mut self) -> HwResult<()> {
        let mut plant = self.0.lock();
        plant.state.motors_enabled = false;
        plant.state.duty = [0.0; 2];
        tracing::debug!("sim MOTORS_EN low");
        Ok(())
    }
}

impl StatusLeds for SimLeds {
    fn set(&mut self, led1: bool, led2: bool) -> HwResult<()> {
        self.0.lock().state.leds = (led1, led2);
        Ok(())
    }
}

impl BatteryMonitor for SimBattery {
    fn volts(&mut self) -> HwResult<f32> {
        Ok(self.0.lock().state.battery_v)
    }
}
