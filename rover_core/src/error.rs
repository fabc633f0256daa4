use std::fmt;

use thiserror::Error;

/// Sensor channels tracked for freshness and sanity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Encoders,
    Imu,
    Range,
    Ir,
}

impl Sensor {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Encoders => "encoders",
            Self::Imu => "imu",
            Self::Range => "range",
            Self::Ir => "ir",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Latched reason the control loop left `Running`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    #[error("sensor stale: {0}")]
    SensorStale(Sensor),
    #[error("sensor out of range: {0}")]
    SensorOutOfRange(Sensor),
    #[error("control loop overrun")]
    LoopOverrun,
    #[error("explicit stop")]
    ExplicitStop,
    #[error("actuator write failed")]
    ActuatorFault,
}

impl FaultCode {
    /// Stable numeric code, also used as the LED2 blink count.
    pub const fn code(self) -> u8 {
        match self {
            Self::SensorStale(_) => 1,
            Self::SensorOutOfRange(_) => 2,
            Self::LoopOverrun => 3,
            Self::ExplicitStop => 4,
            Self::ActuatorFault => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SensorStale(_) => "SensorStale",
            Self::SensorOutOfRange(_) => "SensorOutOfRange",
            Self::LoopOverrun => "LoopOverrun",
            Self::ExplicitStop => "ExplicitStop",
            Self::ActuatorFault => "ActuatorFault",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum RoverError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("control loop faulted: {0}")]
    Faulted(FaultCode),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing encoders")]
    MissingEncoders,
    #[error("missing imu")]
    MissingImu,
    #[error("missing motor bridge")]
    MissingBridge,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
