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
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion control and sensor fusion for a differential-drive rover
//! (hardware-agnostic).
//!
//! All hardware interactions go through the collaborator traits in
//! `rover_traits`. The crate is pure computation over the samples those
//! collaborators deliver, so the whole loop can be replayed deterministically.
//!
//! ## Pipeline
//!
//! One [`Rover::tick`] runs, in order:
//!
//! - **Encoder decoding** (`encoder`): counter wraparound, counts to rad/s
//! - **Odometry** (`odometry`): midpoint dead reckoning
//! - **Inertial fusion** (`fusion`): complementary heading filter, IMU sanity checks
//! - **Proximity** (`proximity`): hazard precedence with release hysteresis
//! - **Target adjustment**: hazard and low-battery scaling
//! - **Wheel PIDs** (`pid`): anti-windup, filtered derivative, clamped duty
//! - **Actuator write**
//!
//! Faults are absorbed into per-tick flags; only sustained faults latch
//! [`LoopState::Faulted`], which [`Rover::fault_code`] exposes.
//!
//! ## Arithmetic
//!
//! Everything runs in `f32`; the target MCU has a single-precision FPU.
//! Counter deltas are decoded in `i64` so that neither width overflows.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod encoder;
pub mod error;
pub mod fusion;
pub mod hw_error;
pub mod math;
pub mod odometry;
pub mod pid;
pub mod proximity;
pub mod runner;
pub mod sampler;
pub mod status;
pub mod types;
pub mod util;

pub use builder::{Missing, RoverBuilder, Set};
pub use config::{
    BatteryCfg, DriveGeometry, EncoderCfg, FusionCfg, PidGains, ProximityCfg, SafetyCfg, Timeouts,
};
pub use crate::core::Rover;
pub use encoder::EncoderDecoder;
pub use error::{BuildError, FaultCode, Report, Result, RoverError, Sensor};
pub use fusion::{Attitude, FusionOutput, InertialFusion};
pub use odometry::integrate;
pub use pid::{MotorPid, PidState};
pub use proximity::{ProximityArbiter, classify_raw};
pub use runner::{RunOptions, RunSummary, StopReason, run};
pub use sampler::Sampler;
pub use status::{FaultFlags, LoopState, TickReport};
pub use types::{ControlCommand, DriveTarget, HazardState, Pose, Side, WheelState};
