//! The fixed-period control loop (`Rover`).
//!
//! One call to [`Rover::tick`] runs the whole pipeline in a fixed order:
//! stop line, encoders, odometry, inertial fusion, proximity, target
//! adjustment, both wheel PIDs, actuator write. The tick never returns an
//! error; problems surface as [`FaultFlags`] in the report and, when they
//! persist, as a latched [`LoopState::Faulted`].

use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;
use rover_traits::{
    BatteryMonitor, Clock, Encoders, Imu, IrArray, IrReading, MotorBridge, RangeSensor, StatusLeds,
};

use crate::config::{BatteryCfg, DriveGeometry, SafetyCfg};
use crate::encoder::EncoderDecoder;
use crate::error::{FaultCode, Result, RoverError};
use crate::fusion::InertialFusion;
use crate::hw_error::map_hw_error;
use crate::odometry;
use crate::pid::MotorPid;
use crate::proximity::ProximityArbiter;
use crate::status::{FaultFlags, LoopState, TickReport};
use crate::types::{ControlCommand, DriveTarget, HazardState, Pose, WheelState};

const ENCODERS: usize = 0;
const IMU: usize = 1;
const RANGE: usize = 2;
const IR: usize = 3;

/// Missed-delivery counter for one sensor channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SensorHealth {
    missed: u32,
    stale_after: u32,
}

impl SensorHealth {
    pub(crate) const fn new(stale_after: u32) -> Self {
        Self {
            missed: 0,
            stale_after,
        }
    }

    fn fresh(&mut self) {
        self.missed = 0;
    }

    /// Count a miss; true once the channel is past its freshness window.
    fn miss(&mut self) -> bool {
        self.missed = self.missed.saturating_add(1);
        self.is_stale()
    }

    fn is_stale(&self) -> bool {
        self.missed >= self.stale_after
    }
}

/// What the sensing half of a tick produced.
struct Sensed {
    wheels: [WheelState; 2],
    hazard: HazardState,
}

pub struct Rover {
    pub(crate) encoders: Box<dyn Encoders>,
    pub(crate) imu: Box<dyn Imu>,
    pub(crate) bridge: Box<dyn MotorBridge>,
    pub(crate) range: Option<Box<dyn RangeSensor>>,
    pub(crate) ir: Option<Box<dyn IrArray>>,
    pub(crate) leds: Option<Box<dyn StatusLeds>>,
    pub(crate) battery_monitor: Option<Box<dyn BatteryMonitor>>,
    pub(crate) battery: BatteryCfg,
    pub(crate) stop_check: Option<Box<dyn Fn() -> bool>>,
    pub(crate) stop_debounce_n: u8,
    pub(crate) stop_count: u8,

    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) period_us: u64,
    pub(crate) dt: f32,
    pub(crate) blink_ticks: u32,

    pub(crate) geometry: DriveGeometry,
    pub(crate) safety: SafetyCfg,
    pub(crate) decoder: EncoderDecoder,
    pub(crate) fusion: InertialFusion,
    pub(crate) arbiter: ProximityArbiter,
    pub(crate) pid: [MotorPid; 2],
    pub(crate) health: [SensorHealth; 4],

    pub(crate) state: LoopState,
    pub(crate) tick: u64,
    pub(crate) pose: Pose,
    pub(crate) wheels: [WheelState; 2],
    pub(crate) target: DriveTarget,
    pub(crate) last_command: ControlCommand,
    pub(crate) last_imu_ts: Option<u64>,
    pub(crate) last_tof: Option<u16>,
    pub(crate) last_ir: Option<IrReading>,
    pub(crate) low_battery: bool,
    pub(crate) battery_warned: bool,
    pub(crate) consecutive_fault_ticks: u32,
    pub(crate) consecutive_overruns: u32,
    pub(crate) overrun_count: u64,
    pub(crate) leds_shown: Option<(bool, bool)>,
}

impl std::fmt::Debug for Rover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rover")
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("pose", &self.pose)
            .field("target", &self.target)
            .field("hazard", &self.arbiter.state())
            .finish_non_exhaustive()
    }
}

impl Rover {
    /// Start building a Rover.
    pub fn builder() -> crate::builder::RoverBuilder<
        crate::builder::Missing,
        crate::builder::Missing,
        crate::builder::Missing,
    > {
        crate::builder::RoverBuilder::default()
    }

    /// Run one control period.
    pub fn tick(&mut self) -> TickReport {
        let start = self.clock.now();
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        let mut flags = FaultFlags::default();

        if self.poll_stop() && self.state == LoopState::Running {
            tracing::info!(tick, "stop line asserted");
            self.enter_idle();
        }

        let (sensed, target, command) = match self.state {
            LoopState::Faulted(_) => {
                let command = self.write_zero(&mut flags);
                (None, DriveTarget::ZERO, command)
            }
            LoopState::Idle => {
                let sensed = self.sense(tick, &mut flags);
                let command = self.write_zero(&mut flags);
                (Some(sensed), DriveTarget::ZERO, command)
            }
            LoopState::Running => {
                let sensed = self.sense(tick, &mut flags);
                let target = self.adjusted_target();
                let command = self.control(start, &sensed, target, &mut flags);
                (Some(sensed), target, command)
            }
        };

        let elapsed_us = self.clock.us_since(start);
        if self.state == LoopState::Running {
            flags.overrun |= elapsed_us > self.period_us;
            self.escalate(tick, &flags, elapsed_us);
        }

        if !flags.overrun {
            self.show_status(tick, sensed.as_ref().map_or(HazardState::Clear, |s| s.hazard));
        }

        let saturated = self.pid.iter().any(|p| p.state().saturated);
        let report = TickReport {
            tick,
            state: self.state,
            pose: self.pose,
            wheels: self.wheels,
            hazard: self.arbiter.state(),
            target,
            command: if self.state.fault().is_some() {
                ControlCommand::ZERO
            } else {
                command
            },
            saturated,
            low_battery: self.low_battery,
            flags,
            elapsed_us,
        };
        tracing::trace!(
            tick,
            state = report.state.name(),
            hazard = report.hazard.name(),
            left = report.command.left_duty,
            right = report.command.right_duty,
            elapsed_us,
            "tick"
        );
        report
    }

    /// Idle → Running. Refused while faulted.
    pub fn enable(&mut self) -> Result<()> {
        match self.state {
            LoopState::Faulted(code) => Err(eyre::Report::new(RoverError::Faulted(code))),
            LoopState::Running => Ok(()),
            LoopState::Idle => {
                self.bridge
                    .enable()
                    .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                    .wrap_err("enabling motor bridge")?;
                for pid in &mut self.pid {
                    pid.reset();
                }
                self.low_battery = false;
                self.battery_warned = false;
                self.consecutive_fault_ticks = 0;
                self.consecutive_overruns = 0;
                self.transition(LoopState::Running);
                Ok(())
            }
        }
    }

    /// Running → Idle with outputs zeroed. No effect in other states.
    pub fn disable(&mut self) -> Result<()> {
        if self.state != LoopState::Running {
            return Ok(());
        }
        self.enter_idle();
        self.bridge
            .disable()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("disabling motor bridge")
    }

    /// Explicit stop from the supervisor: latch `Faulted(ExplicitStop)` now.
    pub fn halt(&mut self) {
        if self.state.fault().is_none() {
            self.latch(FaultCode::ExplicitStop);
        }
    }

    /// Faulted → Idle. Estimators are re-primed from the current pose.
    ///
    /// Returns false when the loop was not faulted.
    pub fn reset(&mut self) -> bool {
        let LoopState::Faulted(code) = self.state else {
            return false;
        };
        tracing::info!(code = code.name(), "fault reset");
        self.decoder.reset();
        self.fusion.reset(self.pose.heading);
        self.arbiter.reset();
        for pid in &mut self.pid {
            pid.reset();
        }
        for h in &mut self.health {
            h.fresh();
        }
        self.last_imu_ts = None;
        self.last_tof = None;
        self.last_ir = None;
        self.low_battery = false;
        self.battery_warned = false;
        self.consecutive_fault_ticks = 0;
        self.consecutive_overruns = 0;
        self.stop_count = 0;
        self.last_command = ControlCommand::ZERO;
        self.transition(LoopState::Idle);
        true
    }

    /// Wheel velocity setpoints for the following ticks. Non-finite targets stop.
    pub fn set_target(&mut self, target: DriveTarget) {
        if target.is_finite() {
            self.target = target;
        } else {
            tracing::warn!(?target, "non-finite target replaced by zero");
            self.target = DriveTarget::ZERO;
        }
    }

    /// Re-seed the pose estimate, e.g. at a known start location.
    pub fn set_pose(&mut self, pose: Pose) {
        let heading = crate::math::normalize_angle(pose.heading);
        self.pose = Pose { heading, ..pose };
        self.fusion.reset(heading);
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Queryable fault surface; `None` unless faulted.
    pub fn fault_code(&self) -> Option<FaultCode> {
        self.state.fault()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn wheels(&self) -> &[WheelState; 2] {
        &self.wheels
    }

    pub fn hazard(&self) -> HazardState {
        self.arbiter.state()
    }

    pub fn target(&self) -> DriveTarget {
        self.target
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn overrun_count(&self) -> u64 {
        self.overrun_count
    }

    /// IMU samples rejected since construction.
    pub fn fusion_faults(&self) -> u32 {
        self.fusion.fault_count()
    }

    pub fn gyro_bias_z(&self) -> f32 {
        self.fusion.bias_z()
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn geometry(&self) -> &DriveGeometry {
        &self.geometry
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Microseconds since the rover was built.
    pub fn uptime_us(&self) -> u64 {
        self.clock.us_since(self.epoch)
    }

    // ── Private: tick stages ─────────────────────────────────────────────────

    fn poll_stop(&mut self) -> bool {
        let Some(check) = &self.stop_check else {
            return false;
        };
        if check() {
            self.stop_count = self.stop_count.saturating_add(1);
        } else {
            self.stop_count = 0;
        }
        self.stop_count >= self.stop_debounce_n
    }

    fn sense(&mut self, tick: u64, flags: &mut FaultFlags) -> Sensed {
        let dt = self.dt;

        let wheels = match self.encoders.read_counts() {
            Ok(raw) => {
                self.health[ENCODERS].fresh();
                self.decoder.update(raw, dt, tick)
            }
            Err(e) => {
                tracing::debug!(error = %map_hw_error(&*e), "encoder read failed");
                flags.encoders_stale = self.health[ENCODERS].miss();
                self.decoder.hold()
            }
        };
        self.wheels = wheels;

        let odom = odometry::integrate(self.pose, &wheels, dt, &self.geometry);
        let sample = match self.imu.latest() {
            Ok(Some(s)) if self.last_imu_ts != Some(s.timestamp_us) => Some(s),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %map_hw_error(&*e), "imu read failed");
                None
            }
        };
        self.pose = match sample {
            Some(s) => {
                self.last_imu_ts = Some(s.timestamp_us);
                self.health[IMU].fresh();
                let stationary = self.fusion.is_stationary(&wheels);
                let out = self.fusion.fuse(odom, &s, dt, stationary);
                flags.imu_rejected = !out.accepted;
                out.pose
            }
            None => {
                flags.imu_stale = self.health[IMU].miss();
                self.fusion.hold(odom)
            }
        };

        if let Some(range) = self.range.as_mut() {
            match range.latest_mm() {
                Ok(Some(mm)) => {
                    self.last_tof = Some(mm);
                    self.health[RANGE].fresh();
                }
                Ok(None) => flags.range_stale = self.health[RANGE].miss(),
                Err(e) => {
                    tracing::debug!(error = %map_hw_error(&*e), "range read failed");
                    flags.range_stale = self.health[RANGE].miss();
                }
            }
        }
        if let Some(ir) = self.ir.as_mut() {
            match ir.latest() {
                Ok(Some(reading)) => {
                    self.last_ir = Some(reading);
                    self.health[IR].fresh();
                }
                Ok(None) => flags.ir_stale = self.health[IR].miss(),
                Err(e) => {
                    tracing::debug!(error = %map_hw_error(&*e), "ir read failed");
                    flags.ir_stale = self.health[IR].miss();
                }
            }
        }
        let hazard = self.arbiter.classify(self.last_ir.as_ref(), self.last_tof);

        self.check_battery();
        Sensed { wheels, hazard }
    }

    fn check_battery(&mut self) {
        let Some(monitor) = self.battery_monitor.as_mut() else {
            return;
        };
        match monitor.volts() {
            Ok(v) if v < self.battery.critical_v => {
                if !self.low_battery {
                    tracing::error!(
                        volts = v,
                        critical_v = self.battery.critical_v,
                        "battery critical"
                    );
                }
                self.low_battery = true;
            }
            Ok(v) if v < self.battery.warn_v => {
                if !self.battery_warned {
                    tracing::warn!(volts = v, warn_v = self.battery.warn_v, "battery low");
                    self.battery_warned = true;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %map_hw_error(&*e), "battery read failed"),
        }
    }

    fn adjusted_target(&self) -> DriveTarget {
        if self.low_battery {
            return DriveTarget::ZERO;
        }
        self.target.scaled(self.arbiter.speed_ratio())
    }

    /// PID stage plus actuator write. Skips PID when the period is already spent.
    fn control(
        &mut self,
        start: Instant,
        sensed: &Sensed,
        target: DriveTarget,
        flags: &mut FaultFlags,
    ) -> ControlCommand {
        let command = if self.clock.us_since(start) > self.period_us {
            flags.overrun = true;
            let forced_zero = target == DriveTarget::ZERO || !sensed.hazard.is_clear();
            if forced_zero {
                ControlCommand::ZERO
            } else {
                ControlCommand {
                    valid: false,
                    ..self.last_command
                }
            }
        } else {
            let [left, right] = &mut self.pid;
            let cmd = ControlCommand {
                left_duty: left.update(target.left, sensed.wheels[0].angular_velocity, self.dt),
                right_duty: right.update(target.right, sensed.wheels[1].angular_velocity, self.dt),
                valid: true,
            };
            self.last_command = cmd;
            cmd
        };

        if let Err(e) = self.bridge.set_duty(command.left_duty, command.right_duty) {
            tracing::warn!(error = %map_hw_error(&*e), "set_duty failed");
            flags.actuator_error = true;
        }
        command
    }

    fn write_zero(&mut self, flags: &mut FaultFlags) -> ControlCommand {
        if let Err(e) = self.bridge.set_duty(0.0, 0.0) {
            tracing::debug!(error = %map_hw_error(&*e), "zero duty write failed");
            flags.actuator_error = true;
        }
        ControlCommand::ZERO
    }

    fn escalate(&mut self, tick: u64, flags: &FaultFlags, elapsed_us: u64) {
        if flags.overrun {
            self.overrun_count = self.overrun_count.saturating_add(1);
            self.consecutive_overruns = self.consecutive_overruns.saturating_add(1);
            tracing::warn!(
                tick,
                elapsed_us,
                period_us = self.period_us,
                consecutive = self.consecutive_overruns,
                "tick overrun"
            );
            if self.consecutive_overruns >= self.safety.overrun_limit {
                self.latch(FaultCode::LoopOverrun);
                return;
            }
        } else {
            self.consecutive_overruns = 0;
        }

        if flags.any_sensor_or_actuator() {
            self.consecutive_fault_ticks = self.consecutive_fault_ticks.saturating_add(1);
            if self.consecutive_fault_ticks >= self.safety.fault_limit_ticks
                && let Some(code) = flags.dominant()
            {
                self.latch(code);
            }
        } else {
            self.consecutive_fault_ticks = 0;
        }
    }

    fn enter_idle(&mut self) {
        if let Err(e) = self.bridge.set_duty(0.0, 0.0) {
            tracing::warn!(error = %map_hw_error(&*e), "zero duty write failed");
        }
        for pid in &mut self.pid {
            pid.reset();
        }
        self.last_command = ControlCommand::ZERO;
        self.transition(LoopState::Idle);
    }

    fn latch(&mut self, code: FaultCode) {
        tracing::error!(code = code.name(), fault = %code, tick = self.tick, "control loop faulted");
        if let Err(e) = self.bridge.set_duty(0.0, 0.0) {
            tracing::warn!(error = %map_hw_error(&*e), "zero duty write failed while faulting");
        }
        if let Err(e) = self.bridge.disable() {
            tracing::warn!(error = %map_hw_error(&*e), "bridge disable failed while faulting");
        }
        for pid in &mut self.pid {
            pid.reset();
        }
        self.last_command = ControlCommand::ZERO;
        self.transition(LoopState::Faulted(code));
    }

    fn transition(&mut self, to: LoopState) {
        if self.state != to {
            tracing::info!(from = self.state.name(), to = to.name(), "loop state change");
            self.state = to;
        }
    }

    /// LED1 on while running. LED2 mirrors hazards, or blinks the fault code.
    fn show_status(&mut self, tick: u64, hazard: HazardState) {
        let Some(leds) = self.leds.as_mut() else {
            return;
        };
        let led1 = self.state == LoopState::Running;
        let led2 = match self.state {
            LoopState::Faulted(code) => {
                let pulses = u64::from(code.code());
                let cycle = 2 * pulses + 3;
                let phase = (tick / u64::from(self.blink_ticks.max(1))) % cycle;
                phase < 2 * pulses && phase % 2 == 0
            }
            _ => !hazard.is_clear() || self.low_battery,
        };
        if self.leds_shown == Some((led1, led2)) {
            return;
        }
        match leds.set(led1, led2) {
            Ok(()) => self.leds_shown = Some((led1, led2)),
            Err(e) => tracing::debug!(error = %map_hw_error(&*e), "led write failed"),
        }
    }
}
