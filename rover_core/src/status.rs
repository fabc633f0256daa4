//! Loop state and the per-tick report returned by `Rover::tick`.

use crate::error::FaultCode;
use crate::types::{ControlCommand, DriveTarget, HazardState, Pose, WheelState};

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    /// Sensing only; outputs held at zero.
    #[default]
    Idle,
    /// Closed loop active.
    Running,
    /// Latched until `reset()`; outputs held at zero.
    Faulted(FaultCode),
}

impl LoopState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Faulted(_) => "Faulted",
        }
    }

    pub const fn fault(self) -> Option<FaultCode> {
        match self {
            Self::Faulted(code) => Some(code),
            _ => None,
        }
    }
}

/// Degraded-confidence flags raised during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultFlags {
    pub encoders_stale: bool,
    pub imu_stale: bool,
    pub range_stale: bool,
    pub ir_stale: bool,
    /// IMU sample discarded as out of range.
    pub imu_rejected: bool,
    pub actuator_error: bool,
    pub overrun: bool,
}

impl FaultFlags {
    /// Any flag that counts toward the sustained-fault limit.
    ///
    /// Overrun is escalated on its own counter.
    pub fn any_sensor_or_actuator(&self) -> bool {
        self.encoders_stale
            || self.imu_stale
            || self.range_stale
            || self.ir_stale
            || self.imu_rejected
            || self.actuator_error
    }

    /// Fault code to latch when this tick exhausts the limit.
    ///
    /// Actuator failure outranks encoder staleness, which outranks IMU
    /// problems; range and IR come last.
    pub fn dominant(&self) -> Option<FaultCode> {
        use crate::error::Sensor;
        if self.actuator_error {
            Some(FaultCode::ActuatorFault)
        } else if self.encoders_stale {
            Some(FaultCode::SensorStale(Sensor::Encoders))
        } else if self.imu_rejected {
            Some(FaultCode::SensorOutOfRange(Sensor::Imu))
        } else if self.imu_stale {
            Some(FaultCode::SensorStale(Sensor::Imu))
        } else if self.range_stale {
            Some(FaultCode::SensorStale(Sensor::Range))
        } else if self.ir_stale {
            Some(FaultCode::SensorStale(Sensor::Ir))
        } else {
            None
        }
    }
}

/// Everything observable about one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// State after the tick completed.
    pub state: LoopState,
    pub pose: Pose,
    pub wheels: [WheelState; 2],
    pub hazard: HazardState,
    /// Target after hazard and battery adjustment.
    pub target: DriveTarget,
    /// Command written to the bridge this tick.
    pub command: ControlCommand,
    /// Either PID output hit its clamp.
    pub saturated: bool,
    pub low_battery: bool,
    pub flags: FaultFlags,
    pub elapsed_us: u64,
}
