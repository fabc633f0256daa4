//! Hazard arbitration over the IR array and the ToF range sensor.

use rover_traits::IrReading;

use crate::config::ProximityCfg;
use crate::types::HazardState;

const FRONT_LEFT: usize = 0;
const FRONT_RIGHT: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;

/// Instantaneous classification of one set of readings, without hysteresis.
///
/// A missing IR frame or ToF reading contributes no trigger. Floor-facing
/// channels never count as obstacles.
pub fn classify_raw(
    cfg: &ProximityCfg,
    ir: Option<&IrReading>,
    tof_mm: Option<u16>,
) -> HazardState {
    if tof_mm.is_some_and(|mm| mm < cfg.critical_range_mm) {
        return HazardState::RangeCritical;
    }
    let Some(ir) = ir else {
        return HazardState::Clear;
    };
    let ch = ir.channels();
    let obstacle = |i: usize, threshold: u16| !cfg.floor_mask[i] && ch[i] > threshold;

    if obstacle(FRONT_LEFT, cfg.front_threshold) && obstacle(FRONT_RIGHT, cfg.front_threshold) {
        return HazardState::FrontObstacle;
    }
    if obstacle(LEFT, cfg.side_threshold) != obstacle(RIGHT, cfg.side_threshold) {
        return HazardState::SideObstacle;
    }
    let on_line = ch
        .iter()
        .zip(cfg.floor_mask)
        .any(|(&v, floor)| floor && v < cfg.line_threshold);
    if on_line {
        HazardState::LineBoundary
    } else {
        HazardState::Clear
    }
}

/// Hysteretic arbiter.
///
/// Moving to an equal or higher precedence state happens on the tick it is
/// observed. Moving down requires `release_ticks` consecutive observations
/// below the current state; the arbiter then adopts whatever the latest raw
/// state is.
#[derive(Debug, Clone)]
pub struct ProximityArbiter {
    cfg: ProximityCfg,
    state: HazardState,
    release_count: u16,
}

impl ProximityArbiter {
    pub fn new(cfg: ProximityCfg) -> Self {
        Self {
            cfg,
            state: HazardState::Clear,
            release_count: 0,
        }
    }

    pub fn classify(&mut self, ir: Option<&IrReading>, tof_mm: Option<u16>) -> HazardState {
        let raw = classify_raw(&self.cfg, ir, tof_mm);
        if raw >= self.state {
            if raw != self.state {
                tracing::debug!(from = self.state.name(), to = raw.name(), "hazard raised");
            }
            self.state = raw;
            self.release_count = 0;
            return self.state;
        }

        self.release_count = self.release_count.saturating_add(1);
        if self.release_count >= self.cfg.release_ticks.max(1) {
            tracing::debug!(from = self.state.name(), to = raw.name(), "hazard released");
            self.state = raw;
            self.release_count = 0;
        }
        self.state
    }

    pub fn state(&self) -> HazardState {
        self.state
    }

    /// Scale factor applied to wheel targets under the current state.
    pub fn speed_ratio(&self) -> f32 {
        match self.state {
            HazardState::Clear => 1.0,
            HazardState::LineBoundary | HazardState::SideObstacle => {
                self.cfg.reduced_speed_ratio.clamp(0.0, 1.0)
            }
            HazardState::FrontObstacle | HazardState::RangeCritical => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.state = HazardState::Clear;
        self.release_count = 0;
    }
}
