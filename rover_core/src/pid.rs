//! Wheel velocity PID.
//!
//! [`compute`] is a pure step function; [`MotorPid`] wraps it with owned state
//! for the scheduler.

use crate::config::PidGains;
use crate::math::clamp_symmetric;

/// Per-wheel controller memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    /// Accumulated error·s, kept within `±integral_limit`.
    pub integral: f32,
    pub prev_error: f32,
    /// Filtered derivative of the error.
    pub derivative: f32,
    /// False until the first valid update; the derivative is zero on that step.
    pub primed: bool,
    /// Output hit the duty clamp on the last update.
    pub saturated: bool,
}

/// One PID step.
///
/// Non-finite inputs or a non-positive period yield zero duty and leave the
/// state untouched. The integral is frozen while the unclamped output is
/// saturated in the direction of the error (conditional integration).
pub fn compute(
    gains: &PidGains,
    target: f32,
    measured: f32,
    dt: f32,
    state: PidState,
) -> (f32, PidState) {
    if !(target.is_finite() && measured.is_finite() && dt.is_finite() && dt > 0.0) {
        return (0.0, state);
    }
    let limit = gains.duty_limit.abs();
    let error = target - measured;

    let derivative = if state.primed {
        let raw = (error - state.prev_error) / dt;
        let a = gains.derivative_alpha.clamp(0.0, 1.0);
        a * raw + (1.0 - a) * state.derivative
    } else {
        0.0
    };

    let p = gains.kp * error;
    let d = gains.kd * derivative;
    let candidate = clamp_symmetric(state.integral + error * dt, gains.integral_limit);
    let unclamped = p + gains.ki * candidate + d;

    let pushing_further =
        (unclamped > limit && error > 0.0) || (unclamped < -limit && error < 0.0);
    let integral = if pushing_further {
        state.integral
    } else {
        candidate
    };

    let raw_out = p + gains.ki * integral + d;
    let duty = clamp_symmetric(raw_out, limit);
    let saturated = raw_out.abs() > limit;

    (
        duty,
        PidState {
            integral,
            prev_error: error,
            derivative,
            primed: true,
            saturated,
        },
    )
}

/// Owned PID for one wheel.
#[derive(Debug, Clone)]
pub struct MotorPid {
    gains: PidGains,
    state: PidState,
}

impl MotorPid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
        }
    }

    pub fn update(&mut self, target: f32, measured: f32, dt: f32) -> f32 {
        let (duty, next) = compute(&self.gains, target, measured, dt, self.state);
        self.state = next;
        duty
    }

    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }
}
