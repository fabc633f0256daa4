//! Fixed-period driver for `Rover::tick`.
//!
//! Pacing uses absolute deadlines on the rover's own clock so that jitter in
//! one period does not accumulate. A late tick does not trigger catch-up
//! ticks; the schedule restarts from the late tick instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::Rover;
use crate::error::{Result, RoverError};
use crate::status::{LoopState, TickReport};
use crate::types::{DriveTarget, Pose};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many ticks. `None` runs until shutdown or fault.
    pub max_ticks: Option<u64>,
    /// Cooperative shutdown flag, checked before every tick.
    pub shutdown: Option<Arc<AtomicBool>>,
    /// Call `enable()` before the first tick.
    pub enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    TickBudget,
}

/// Loop statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub overruns: u64,
    /// Deadlines already in the past when the tick finished.
    pub missed_deadlines: u64,
    pub min_latency_us: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub final_state: LoopState,
    pub pose: Pose,
    pub reason: StopReason,
}

#[derive(Debug, Default)]
struct Latency {
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Latency {
    fn record(&mut self, us: u64) {
        self.min = if self.count == 0 { us } else { self.min.min(us) };
        self.max = self.max.max(us);
        self.sum = self.sum.saturating_add(us);
        self.count += 1;
    }

    fn avg(&self) -> u64 {
        self.sum.checked_div(self.count).unwrap_or(0)
    }
}

/// Drive `rover` at its configured rate.
///
/// `on_tick` sees every report and may return a new wheel target for the next
/// tick. Returns an error carrying the fault code when the loop latches
/// `Faulted`; the bridge has already been zeroed and disabled by then.
pub fn run<F>(rover: &mut Rover, opts: &RunOptions, mut on_tick: F) -> Result<RunSummary>
where
    F: FnMut(&TickReport) -> Option<DriveTarget>,
{
    if opts.enable {
        rover.enable()?;
    }
    let clock = rover.clock();
    let period = Duration::from_micros(rover.period_us());
    let mut latency = Latency::default();
    let mut ticks: u64 = 0;
    let mut missed_deadlines: u64 = 0;
    let overruns_at_start = rover.overrun_count();

    tracing::info!(period_us = rover.period_us(), max_ticks = ?opts.max_ticks, "control loop start");

    let mut deadline = clock.now() + period;
    let reason = loop {
        if opts
            .shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
        {
            break StopReason::Shutdown;
        }
        if opts.max_ticks.is_some_and(|max| ticks >= max) {
            break StopReason::TickBudget;
        }

        let report = rover.tick();
        ticks += 1;
        latency.record(report.elapsed_us);

        if let Some(target) = on_tick(&report) {
            rover.set_target(target);
        }

        if let LoopState::Faulted(code) = report.state {
            tracing::error!(
                ticks,
                overruns = rover.overrun_count() - overruns_at_start,
                max_latency_us = latency.max,
                code = code.name(),
                "control loop stopped on fault"
            );
            return Err(eyre::Report::new(RoverError::Faulted(code)));
        }

        let now = clock.now();
        if now < deadline {
            clock.sleep(deadline - now);
            deadline += period;
        } else {
            missed_deadlines += 1;
            deadline = now + period;
        }
    };

    if let Err(e) = rover.disable() {
        tracing::warn!(error = %e, "disable failed at loop exit");
    }

    let summary = RunSummary {
        ticks,
        overruns: rover.overrun_count() - overruns_at_start,
        missed_deadlines,
        min_latency_us: latency.min,
        avg_latency_us: latency.avg(),
        max_latency_us: latency.max,
        final_state: rover.state(),
        pose: rover.pose(),
        reason,
    };
    tracing::info!(
        ticks = summary.ticks,
        overruns = summary.overruns,
        missed_deadlines = summary.missed_deadlines,
        avg_latency_us = summary.avg_latency_us,
        max_latency_us = summary.max_latency_us,
        reason = ?summary.reason,
        "control loop stop"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::Latency;

    #[test]
    fn latency_tracks_min_avg_max() {
        let mut l = Latency::default();
        assert_eq!(l.avg(), 0);
        for us in [30, 10, 20] {
            l.record(us);
        }
        assert_eq!(l.min, 10);
        assert_eq!(l.max, 30);
        assert_eq!(l.avg(), 20);
    }
}
