//! Hardware collaborator surface for the rover motion core.
//!
//! Every peripheral the control loop touches is reached through one of these
//! traits. Implementations live in `rover_hardware` (simulation and replay) or
//! in board support code; the core never sees a register.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type carried across every collaborator boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Free-running quadrature counter values for both wheels.
///
/// Counters wrap at the hardware width (16 or 32 bits); decoding the signed
/// delta is the consumer's job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounts {
    pub left: u32,
    pub right: u32,
}

/// One inertial measurement as delivered by the IMU driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    /// Angular rate about x, y, z in rad/s.
    pub gyro: [f32; 3],
    /// Linear acceleration along x, y, z in m/s².
    pub accel: [f32; 3],
    /// Driver timestamp in microseconds; repeats mean "no new sample".
    pub timestamp_us: u64,
}

/// Reflected intensity on the four IR channels, after emitter pulsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrReading {
    pub front_left: u16,
    pub front_right: u16,
    pub left: u16,
    pub right: u16,
}

impl IrReading {
    /// Channels in fixed order: front-left, front-right, left, right.
    #[inline]
    pub fn channels(&self) -> [u16; 4] {
        [self.front_left, self.front_right, self.left, self.right]
    }
}

/// Quadrature encoder counters (`L_ENC_A/B`, `R_ENC_A/B`).
pub trait Encoders {
    fn read_counts(&mut self) -> HwResult<RawCounts>;
}

/// Inertial measurement unit. Non-blocking: `Ok(None)` when no sample is ready.
pub trait Imu {
    fn latest(&mut self) -> HwResult<Option<ImuSample>>;
}

/// Time-of-flight ranging sensor. Non-blocking: `Ok(None)` when no new range.
pub trait RangeSensor {
    fn latest_mm(&mut self) -> HwResult<Option<u16>>;
}

/// IR proximity/line array. Non-blocking: `Ok(None)` when no new frame.
pub trait IrArray {
    fn latest(&mut self) -> HwResult<Option<IrReading>>;
}

/// Dual H-bridge. Duty is signed in [-1, 1]; sign selects direction.
pub trait MotorBridge {
    fn set_duty(&mut self, left: f32, right: f32) -> HwResult<()>;
    /// Drive `MOTORS_EN` high.
    fn enable(&mut self) -> HwResult<()>;
    /// Drive `MOTORS_EN` low; the bridge coasts regardless of duty.
    fn disable(&mut self) -> HwResult<()>;
}

/// `LED1` / `LED2`.
pub trait StatusLeds {
    fn set(&mut self, led1: bool, led2: bool) -> HwResult<()>;
}

/// `VBATT_MON` divider, already scaled to pack volts.
pub trait BatteryMonitor {
    fn volts(&mut self) -> HwResult<f32>;
}
