//! Values exchanged between pipeline stages.

use crate::config::DriveGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Decoded state of one wheel for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    pub side: Side,
    /// Counter value as read, masked to the counter width.
    pub raw_count: u32,
    /// Unwrapped running total of decoded deltas.
    pub position_ticks: i64,
    /// Signed delta decoded this tick.
    pub delta_ticks: i64,
    /// Wheel angular velocity in rad/s.
    pub angular_velocity: f32,
    /// No valid velocity this tick (priming, repeated tick, zero period, or missed read).
    pub stale: bool,
}

impl WheelState {
    pub const fn new(side: Side) -> Self {
        Self {
            side,
            raw_count: 0,
            position_ticks: 0,
            delta_ticks: 0,
            angular_velocity: 0.0,
            stale: true,
        }
    }
}

/// Planar pose with body-frame velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Heading in (-π, π].
    pub heading: f32,
    pub linear_velocity: f32,
    pub angular_velocity: f32,
}

impl Pose {
    pub const fn at(x: f32, y: f32, heading: f32) -> Self {
        Self {
            x,
            y,
            heading,
            linear_velocity: 0.0,
            angular_velocity: 0.0,
        }
    }
}

/// Hazard classification, lowest to highest precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HazardState {
    #[default]
    Clear,
    LineBoundary,
    SideObstacle,
    FrontObstacle,
    RangeCritical,
}

impl HazardState {
    #[inline]
    pub fn is_clear(self) -> bool {
        self == Self::Clear
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::LineBoundary => "LineBoundary",
            Self::SideObstacle => "SideObstacle",
            Self::FrontObstacle => "FrontObstacle",
            Self::RangeCritical => "RangeCritical",
        }
    }
}

/// Wheel velocity setpoints in rad/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveTarget {
    pub left: f32,
    pub right: f32,
}

impl DriveTarget {
    pub const ZERO: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Convert a body twist (m/s, rad/s) into wheel setpoints.
    pub fn from_twist(linear: f32, angular: f32, geometry: &DriveGeometry) -> Self {
        let half_track = angular * geometry.wheelbase_m * 0.5;
        let r = geometry.wheel_radius_m;
        Self {
            left: (linear - half_track) / r,
            right: (linear + half_track) / r,
        }
    }

    /// Scale both wheels by `ratio`.
    #[must_use]
    pub fn scaled(self, ratio: f32) -> Self {
        Self {
            left: self.left * ratio,
            right: self.right * ratio,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }
}

/// Duty pair written to the bridge. Sign encodes direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlCommand {
    pub left_duty: f32,
    pub right_duty: f32,
    /// False when this command was forced (stop, fault, idle) rather than computed.
    pub valid: bool,
}

impl ControlCommand {
    pub const ZERO: Self = Self {
        left_duty: 0.0,
        right_duty: 0.0,
        valid: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twist_round_trips_through_kinematics() {
        let g = DriveGeometry {
            wheel_radius_m: 0.02,
            wheelbase_m: 0.2,
        };
        let t = DriveTarget::from_twist(0.3, 1.0, &g);
        let v = (t.left + t.right) * 0.5 * g.wheel_radius_m;
        let w = (t.right - t.left) * g.wheel_radius_m / g.wheelbase_m;
        assert!((v - 0.3).abs() < 1e-5);
        assert!((w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hazard_order_matches_precedence() {
        assert!(HazardState::RangeCritical > HazardState::FrontObstacle);
        assert!(HazardState::FrontObstacle > HazardState::SideObstacle);
        assert!(HazardState::SideObstacle > HazardState::LineBoundary);
        assert!(HazardState::LineBoundary > HazardState::Clear);
    }
}
