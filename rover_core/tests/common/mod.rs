#![allow(dead_code)]
//! Scriptable collaborators shared by the integration tests.
//!
//! Every double is a cheap handle over shared state so a test can keep one
//! copy, give the other to the builder, and poke at it between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rover_core::{Rover, RoverBuilder, Set};
use rover_traits::{
    BatteryMonitor, Encoders, HwResult, Imu, ImuSample, IrArray, IrReading, ManualClock,
    MotorBridge, RangeSensor, RawCounts, StatusLeds,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Encoders ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EncState {
    pub counts: RawCounts,
    /// Added to the counters on every successful read.
    pub step: (u32, u32),
    /// Reads fail while set.
    pub fail: bool,
    /// Wheels keep turning while reads fail.
    pub turn_while_failing: bool,
    /// Time the read takes on the shared clock.
    pub lag: Duration,
}

#[derive(Clone)]
pub struct ScriptEncoders {
    pub state: Arc<Mutex<EncState>>,
    clock: ManualClock,
}

impl ScriptEncoders {
    pub fn set_step(&self, left: u32, right: u32) {
        lock(&self.state).step = (left, right);
    }
    pub fn set_fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }
    pub fn set_lag(&self, lag: Duration) {
        lock(&self.state).lag = lag;
    }
    pub fn set_turn_while_failing(&self, turn: bool) {
        lock(&self.state).turn_while_failing = turn;
    }
}

impl Encoders for ScriptEncoders {
    fn read_counts(&mut self) -> HwResult<RawCounts> {
        let mut s = lock(&self.state);
        self.clock.advance(s.lag);
        if s.fail && !s.turn_while_failing {
            return Err("encoder timeout".into());
        }
        let (dl, dr) = s.step;
        s.counts.left = s.counts.left.wrapping_add(dl);
        s.counts.right = s.counts.right.wrapping_add(dr);
        if s.fail {
            return Err("encoder timeout".into());
        }
        Ok(s.counts)
    }
}

// ── IMU ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ImuState {
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    /// New timestamp on every poll while set; otherwise the last sample repeats.
    pub fresh: bool,
    pub timestamp_us: u64,
}

impl Default for ImuState {
    fn default() -> Self {
        Self {
            gyro: [0.0; 3],
            accel: [0.0, 0.0, 9.81],
            fresh: true,
            timestamp_us: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct ScriptImu(pub Arc<Mutex<ImuState>>);

impl ScriptImu {
    pub fn set_gyro_z(&self, gz: f32) {
        lock(&self.0).gyro[2] = gz;
    }
    pub fn set_fresh(&self, fresh: bool) {
        lock(&self.0).fresh = fresh;
    }
}

impl Imu for ScriptImu {
    fn latest(&mut self) -> HwResult<Option<ImuSample>> {
        let mut s = lock(&self.0);
        if s.fresh {
            s.timestamp_us += 2_000;
        }
        Ok(Some(ImuSample {
            gyro: s.gyro,
            accel: s.accel,
            timestamp_us: s.timestamp_us,
        }))
    }
}

// ── Proximity ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ScriptIr(pub Arc<Mutex<Option<IrReading>>>);

impl Default for ScriptIr {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Some(IrReading::default()))))
    }
}

impl ScriptIr {
    pub fn set(&self, reading: Option<IrReading>) {
        *lock(&self.0) = reading;
    }
    pub fn front(&self, level: u16) {
        self.set(Some(IrReading {
            front_left: level,
            front_right: level,
            ..IrReading::default()
        }));
    }
}

impl IrArray for ScriptIr {
    fn latest(&mut self) -> HwResult<Option<IrReading>> {
        Ok(*lock(&self.0))
    }
}

#[derive(Clone)]
pub struct ScriptRange(pub Arc<Mutex<Option<u16>>>);

impl Default for ScriptRange {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Some(1000))))
    }
}

impl ScriptRange {
    pub fn set(&self, mm: Option<u16>) {
        *lock(&self.0) = mm;
    }
}

impl RangeSensor for ScriptRange {
    fn latest_mm(&mut self) -> HwResult<Option<u16>> {
        Ok(*lock(&self.0))
    }
}

// ── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BridgeLog {
    pub duties: Vec<(f32, f32)>,
    pub enabled: bool,
    pub enable_calls: u32,
    pub disable_calls: u32,
    pub fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct SpyBridge(pub Arc<Mutex<BridgeLog>>);

impl SpyBridge {
    pub fn last(&self) -> Option<(f32, f32)> {
        lock(&self.0).duties.last().copied()
    }
    pub fn enabled(&self) -> bool {
        lock(&self.0).enabled
    }
    pub fn set_fail(&self, fail: bool) {
        lock(&self.0).fail_writes = fail;
    }
    pub fn log(&self) -> MutexGuard<'_, BridgeLog> {
        lock(&self.0)
    }
}

impl MotorBridge for SpyBridge {
    fn set_duty(&mut self, left: f32, right: f32) -> HwResult<()> {
        let mut log = lock(&self.0);
        if log.fail_writes {
            return Err("pwm write rejected".into());
        }
        log.duties.push((left, right));
        Ok(())
    }
    fn enable(&mut self) -> HwResult<()> {
        let mut log = lock(&self.0);
        log.enabled = true;
        log.enable_calls += 1;
        Ok(())
    }
    fn disable(&mut self) -> HwResult<()> {
        let mut log = lock(&self.0);
        log.enabled = false;
        log.disable_calls += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct SpyLeds(pub Arc<Mutex<Vec<(bool, bool)>>>);

impl SpyLeds {
    pub fn last(&self) -> Option<(bool, bool)> {
        lock(&self.0).last().copied()
    }
    pub fn history(&self) -> Vec<(bool, bool)> {
        lock(&self.0).clone()
    }
}

impl StatusLeds for SpyLeds {
    fn set(&mut self, led1: bool, led2: bool) -> HwResult<()> {
        lock(&self.0).push((led1, led2));
        Ok(())
    }
}

#[derive(Clone)]
pub struct Volts(pub Arc<Mutex<f32>>);

impl Volts {
    pub fn new(v: f32) -> Self {
        Self(Arc::new(Mutex::new(v)))
    }
    pub fn set(&self, v: f32) {
        *lock(&self.0) = v;
    }
}

impl BatteryMonitor for Volts {
    fn volts(&mut self) -> HwResult<f32> {
        Ok(*lock(&self.0))
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

/// One of each collaborator plus a stop line and a manual clock.
pub struct Harness {
    pub clock: ManualClock,
    pub enc: ScriptEncoders,
    pub imu: ScriptImu,
    pub ir: ScriptIr,
    pub range: ScriptRange,
    pub bridge: SpyBridge,
    pub leds: SpyLeds,
    pub stop: Arc<AtomicBool>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        Self {
            enc: ScriptEncoders {
                state: Arc::default(),
                clock: clock.clone(),
            },
            clock,
            imu: ScriptImu::default(),
            ir: ScriptIr::default(),
            range: ScriptRange::default(),
            bridge: SpyBridge::default(),
            leds: SpyLeds::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builder with every collaborator wired; callers add settings and build.
    pub fn builder(&self) -> RoverBuilder<Set, Set, Set> {
        let stop = Arc::clone(&self.stop);
        Rover::builder()
            .with_encoders(self.enc.clone())
            .with_imu(self.imu.clone())
            .with_bridge(self.bridge.clone())
            .with_ir(self.ir.clone())
            .with_range(self.range.clone())
            .with_leds(self.leds.clone())
            .with_clock(Box::new(self.clock.clone()))
            .with_stop_check(move || stop.load(Ordering::Relaxed))
    }

    pub fn rover(&self) -> Rover {
        self.builder().build().expect("rover build")
    }

    pub fn set_stop(&self, asserted: bool) {
        self.stop.store(asserted, Ordering::Relaxed);
    }
}
