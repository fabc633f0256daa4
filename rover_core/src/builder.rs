//! Type-state builder for `Rover`.
//!
//! Encoders, IMU and motor bridge are mandatory; `build()` only exists once all
//! three are set. `try_build()` is always available and reports the first
//! missing piece at runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use rover_traits::{
    BatteryMonitor, Clock, Encoders, Imu, IrArray, MonotonicClock, MotorBridge, RangeSensor,
    StatusLeds,
};

use crate::config::{
    BatteryCfg, DriveGeometry, EncoderCfg, FusionCfg, PidGains, ProximityCfg, SafetyCfg, Timeouts,
};
use crate::core::{Rover, SensorHealth};
use crate::encoder::EncoderDecoder;
use crate::error::{BuildError, Result};
use crate::fusion::InertialFusion;
use crate::pid::MotorPid;
use crate::proximity::ProximityArbiter;
use crate::status::LoopState;
use crate::types::{ControlCommand, DriveTarget, Pose, Side, WheelState};
use crate::util::{dt_seconds, period_us, ticks_for_ms};

const DEFAULT_RATE_HZ: u32 = 500;
const LED_BLINK_MS: u64 = 200;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Everything optional, moved unchanged across type-state transitions.
#[derive(Default)]
struct Options {
    range: Option<Box<dyn RangeSensor>>,
    ir: Option<Box<dyn IrArray>>,
    leds: Option<Box<dyn StatusLeds>>,
    battery_monitor: Option<Box<dyn BatteryMonitor>>,
    stop_check: Option<Box<dyn Fn() -> bool>>,
    stop_debounce_n: Option<u8>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    geometry: Option<DriveGeometry>,
    encoder: Option<EncoderCfg>,
    pid: Option<PidGains>,
    fusion: Option<FusionCfg>,
    proximity: Option<ProximityCfg>,
    timeouts: Option<Timeouts>,
    safety: Option<SafetyCfg>,
    battery: Option<BatteryCfg>,
    rate_hz: Option<u32>,
}

/// Builder for `Rover`. All settings are validated on build.
pub struct RoverBuilder<E, I, M> {
    encoders: Option<Box<dyn Encoders>>,
    imu: Option<Box<dyn Imu>>,
    bridge: Option<Box<dyn MotorBridge>>,
    opts: Options,
    _e: PhantomData<E>,
    _i: PhantomData<I>,
    _m: PhantomData<M>,
}

impl Default for RoverBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            encoders: None,
            imu: None,
            bridge: None,
            opts: Options::default(),
            _e: PhantomData,
            _i: PhantomData,
            _m: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn finite_non_negative(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

fn validate(o: &Options, rate_hz: u32) -> Result<()> {
    if rate_hz == 0 {
        return Err(invalid("rate_hz must be > 0"));
    }
    let g = o.geometry.unwrap_or_default();
    if !positive(g.wheel_radius_m) {
        return Err(invalid("wheel_radius_m must be > 0"));
    }
    if !positive(g.wheelbase_m) {
        return Err(invalid("wheelbase_m must be > 0"));
    }

    let e = o.encoder.unwrap_or_default();
    if e.counts_per_rev == 0 {
        return Err(invalid("counts_per_rev must be > 0"));
    }
    if !positive(e.gear_ratio) {
        return Err(invalid("gear_ratio must be > 0"));
    }
    if e.counter_bits != 16 && e.counter_bits != 32 {
        return Err(invalid("counter_bits must be 16 or 32"));
    }

    let p = o.pid.unwrap_or_default();
    if ![p.kp, p.ki, p.kd, p.integral_limit]
        .into_iter()
        .all(finite_non_negative)
    {
        return Err(invalid("pid gains and integral_limit must be finite and >= 0"));
    }
    if !(positive(p.duty_limit) && p.duty_limit <= 1.0) {
        return Err(invalid("duty_limit must be in (0, 1]"));
    }
    if !(positive(p.derivative_alpha) && p.derivative_alpha <= 1.0) {
        return Err(invalid("derivative_alpha must be in (0, 1]"));
    }

    let f = o.fusion.unwrap_or_default();
    if !(finite_non_negative(f.alpha) && f.alpha <= 1.0) {
        return Err(invalid("fusion alpha must be in [0, 1]"));
    }
    if !positive(f.max_gyro_rad_s) || !positive(f.max_accel_m_s2) {
        return Err(invalid("imu sanity bounds must be > 0"));
    }
    if !f.gyro_bias_z.is_finite() {
        return Err(invalid("gyro_bias_z must be finite"));
    }
    if ![f.bias_learn_rate, f.level_gain]
        .into_iter()
        .all(|v| finite_non_negative(v) && v <= 1.0)
    {
        return Err(invalid("bias_learn_rate and level_gain must be in [0, 1]"));
    }
    if !finite_non_negative(f.stationary_rad_s) {
        return Err(invalid("stationary_rad_s must be >= 0"));
    }

    let x = o.proximity.unwrap_or_default();
    if x.release_ticks == 0 {
        return Err(invalid("release_ticks must be >= 1"));
    }
    if !(finite_non_negative(x.reduced_speed_ratio) && x.reduced_speed_ratio <= 1.0) {
        return Err(invalid("reduced_speed_ratio must be in [0, 1]"));
    }

    let t = o.timeouts.unwrap_or_default();
    if t.encoder_ms == 0 || t.imu_ms == 0 || t.range_ms == 0 || t.ir_ms == 0 {
        return Err(invalid("sensor timeouts must be >= 1 ms"));
    }

    let s = o.safety.unwrap_or_default();
    if s.fault_limit_ticks == 0 {
        return Err(invalid("fault_limit_ticks must be >= 1"));
    }
    if s.overrun_limit == 0 {
        return Err(invalid("overrun_limit must be >= 1"));
    }

    if let Some(b) = o.battery {
        if !(b.warn_v.is_finite() && b.critical_v.is_finite()) {
            return Err(invalid("battery thresholds must be finite"));
        }
        if b.warn_v < b.critical_v {
            return Err(invalid("battery warn_v must be >= critical_v"));
        }
    }
    Ok(())
}

/// Validate settings and assemble a `Rover` in `Idle`.
fn validate_and_build(
    encoders: Box<dyn Encoders>,
    imu: Box<dyn Imu>,
    bridge: Box<dyn MotorBridge>,
    o: Options,
) -> Result<Rover> {
    let rate_hz = o.rate_hz.unwrap_or(DEFAULT_RATE_HZ);
    validate(&o, rate_hz)?;

    let clock: Arc<dyn Clock + Send + Sync> = match o.clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    let period_us = period_us(rate_hz);
    let timeouts = o.timeouts.unwrap_or_default();
    let health = [
        timeouts.encoder_ms,
        timeouts.imu_ms,
        timeouts.range_ms,
        timeouts.ir_ms,
    ]
    .map(|ms| SensorHealth::new(ticks_for_ms(ms, period_us)));

    let fusion_cfg = o.fusion.unwrap_or_default();
    let pid = o.pid.unwrap_or_default();
    let battery_monitor = o.battery_monitor;
    let battery = o.battery.unwrap_or_default();

    tracing::debug!(rate_hz, period_us, ?timeouts, "rover built");

    Ok(Rover {
        encoders,
        imu,
        bridge,
        range: o.range,
        ir: o.ir,
        leds: o.leds,
        battery_monitor,
        battery,
        stop_check: o.stop_check,
        stop_debounce_n: o.stop_debounce_n.unwrap_or(1).max(1),
        stop_count: 0,
        clock,
        epoch,
        period_us,
        dt: dt_seconds(period_us),
        blink_ticks: ticks_for_ms(LED_BLINK_MS, period_us),
        geometry: o.geometry.unwrap_or_default(),
        safety: o.safety.unwrap_or_default(),
        decoder: EncoderDecoder::new(o.encoder.unwrap_or_default()),
        fusion: InertialFusion::new(fusion_cfg),
        arbiter: ProximityArbiter::new(o.proximity.unwrap_or_default()),
        pid: [MotorPid::new(pid), MotorPid::new(pid)],
        health,
        state: LoopState::Idle,
        tick: 0,
        pose: Pose::default(),
        wheels: [WheelState::new(Side::Left), WheelState::new(Side::Right)],
        target: DriveTarget::ZERO,
        last_command: ControlCommand::ZERO,
        last_imu_ts: None,
        last_tof: None,
        last_ir: None,
        low_battery: false,
        battery_warned: false,
        consecutive_fault_ticks: 0,
        consecutive_overruns: 0,
        overrun_count: 0,
        leds_shown: None,
    })
}

impl<E, I, M> RoverBuilder<E, I, M> {
    /// Fallible build available in any type-state; reports the first missing collaborator.
    pub fn try_build(self) -> Result<Rover> {
        let encoders = self
            .encoders
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEncoders))?;
        let imu = self
            .imu
            .ok_or_else(|| eyre::Report::new(BuildError::MissingImu))?;
        let bridge = self
            .bridge
            .ok_or_else(|| eyre::Report::new(BuildError::MissingBridge))?;
        validate_and_build(encoders, imu, bridge, self.opts)
    }

    fn retype<E2, I2, M2>(self) -> RoverBuilder<E2, I2, M2> {
        RoverBuilder {
            encoders: self.encoders,
            imu: self.imu,
            bridge: self.bridge,
            opts: self.opts,
            _e: PhantomData,
            _i: PhantomData,
            _m: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<E, I, M> RoverBuilder<E, I, M> {
    pub fn with_range(mut self, range: impl RangeSensor + 'static) -> Self {
        self.opts.range = Some(Box::new(range));
        self
    }
    pub fn with_ir(mut self, ir: impl IrArray + 'static) -> Self {
        self.opts.ir = Some(Box::new(ir));
        self
    }
    pub fn with_leds(mut self, leds: impl StatusLeds + 'static) -> Self {
        self.opts.leds = Some(Box::new(leds));
        self
    }
    /// Enables low-battery injection with the configured (or default) thresholds.
    pub fn with_battery_monitor(mut self, monitor: impl BatteryMonitor + 'static) -> Self {
        self.opts.battery_monitor = Some(Box::new(monitor));
        self
    }
    pub fn with_stop_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.opts.stop_check = Some(Box::new(f));
        self
    }
    /// Consecutive asserted samples before the stop line takes effect (default 1).
    pub fn with_stop_debounce(mut self, n: u8) -> Self {
        self.opts.stop_debounce_n = Some(n.max(1));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.opts.clock = Some(clock);
        self
    }
    pub fn with_geometry(mut self, geometry: DriveGeometry) -> Self {
        self.opts.geometry = Some(geometry);
        self
    }
    pub fn with_encoder_cfg(mut self, cfg: EncoderCfg) -> Self {
        self.opts.encoder = Some(cfg);
        self
    }
    pub fn with_pid(mut self, gains: PidGains) -> Self {
        self.opts.pid = Some(gains);
        self
    }
    pub fn with_fusion(mut self, cfg: FusionCfg) -> Self {
        self.opts.fusion = Some(cfg);
        self
    }
    pub fn with_proximity(mut self, cfg: ProximityCfg) -> Self {
        self.opts.proximity = Some(cfg);
        self
    }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.opts.timeouts = Some(timeouts);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.opts.safety = Some(safety);
        self
    }
    pub fn with_battery(mut self, battery: BatteryCfg) -> Self {
        self.opts.battery = Some(battery);
        self
    }
    pub fn with_rate_hz(mut self, hz: u32) -> Self {
        self.opts.rate_hz = Some(hz);
        self
    }
}

// Setters that advance type-state
impl<I, M> RoverBuilder<Missing, I, M> {
    pub fn with_encoders(mut self, encoders: impl Encoders + 'static) -> RoverBuilder<Set, I, M> {
        self.encoders = Some(Box::new(encoders));
        self.retype()
    }
}

impl<E, M> RoverBuilder<E, Missing, M> {
    pub fn with_imu(mut self, imu: impl Imu + 'static) -> RoverBuilder<E, Set, M> {
        self.imu = Some(Box::new(imu));
        self.retype()
    }
}

impl<E, I> RoverBuilder<E, I, Missing> {
    pub fn with_bridge(mut self, bridge: impl MotorBridge + 'static) -> RoverBuilder<E, I, Set> {
        self.bridge = Some(Box::new(bridge));
        self.retype()
    }
}

impl RoverBuilder<Set, Set, Set> {
    /// Validate and build. Only available once encoders, IMU and bridge are set.
    pub fn build(self) -> Result<Rover> {
        self.try_build()
    }
}
