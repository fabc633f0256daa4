//! `replay`: push a recorded CSV trace through the control loop on virtual time.

use std::path::Path;
use std::time::Duration;

use eyre::WrapErr;
use rover_config::{Config, TraceRow};
use rover_core::error::{Result, RoverError};
use rover_core::{DriveTarget, Rover};
use rover_hardware::{Frame, ReplayDeck};
use rover_traits::{ImuSample, IrReading, ManualClock, RawCounts};
use serde_json::json;

pub fn frame_from_row(r: &TraceRow) -> Frame {
    Frame {
        t_us: r.t_us,
        counts: RawCounts {
            left: r.left_count,
            right: r.right_count,
        },
        imu: (r.imu_fresh == 1).then_some(ImuSample {
            gyro: [r.gyro_x, r.gyro_y, r.gyro_z],
            accel: [r.accel_x, r.accel_y, r.accel_z],
            timestamp_us: r.t_us,
        }),
        ir: IrReading {
            front_left: r.ir_fl,
            front_right: r.ir_fr,
            left: r.ir_l,
            right: r.ir_r,
        },
        tof_mm: r.tof_mm,
        stop: r.stop == 1,
        target: (r.target_left, r.target_right),
    }
}

/// Replay `trace` frame by frame.
///
/// The loop is enabled before the first frame; a stop line in the trace
/// drops it to Idle for the rest of the replay. Each tick advances virtual
/// time by one control period.
pub fn replay(cfg: &Config, trace: &Path, json: bool) -> Result<()> {
    let rows = rover_config::load_trace_csv(trace)?;
    let deck = ReplayDeck::new(rows.iter().map(frame_from_row).collect());
    tracing::info!(frames = deck.len(), trace = %trace.display(), "replay start");

    let clock = ManualClock::new();
    let stop_line = deck.clone();
    let mut rover = Rover::builder()
        .with_config(cfg)
        .with_encoders(deck.encoders())
        .with_imu(deck.imu())
        .with_bridge(deck.bridge())
        .with_range(deck.range())
        .with_ir(deck.ir())
        .with_clock(Box::new(clock.clone()))
        .with_stop_check(move || stop_line.stop_line())
        .build()
        .wrap_err("building replay loop")?;
    rover.enable()?;
    let period = Duration::from_micros(rover.period_us());

    let mut idle_ticks = 0u64;
    while deck.remaining() > 0 {
        if let Some((left, right)) = deck.next_target() {
            rover.set_target(DriveTarget::new(left, right));
        }
        let report = rover.tick();
        clock.advance(period);
        if json {
            println!(
                "{}",
                json!({
                    "tick": report.tick,
                    "state": report.state.name(),
                    "hazard": report.hazard.name(),
                    "left_duty": report.command.left_duty,
                    "right_duty": report.command.right_duty,
                    "valid": report.command.valid,
                    "x": report.pose.x,
                    "y": report.pose.y,
                    "heading": report.pose.heading,
                })
            );
        }
        if let Some(code) = report.state.fault() {
            tracing::error!(tick = report.tick, code = code.name(), "replay stopped on fault");
            return Err(eyre::Report::new(RoverError::Faulted(code)))
                .wrap_err_with(|| format!("replay of {}", trace.display()));
        }
        if report.state == rover_core::LoopState::Idle {
            idle_ticks += 1;
        }
    }

    let pose = rover.pose();
    let writes = deck.commands().len();
    tracing::info!(ticks = rover.tick_count(), writes, idle_ticks, "replay done");
    if !json {
        println!(
            "replay complete: {} frames, {} duty writes, {} idle ticks, final state {}, pose x={:.3} m y={:.3} m heading={:.3} rad",
            deck.len(),
            writes,
            idle_ticks,
            rover.state().name(),
            pose.x,
            pose.y,
            pose.heading
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_imu_rows_carry_no_sample() {
        let row = TraceRow {
            t_us: 2000,
            left_count: 10,
            right_count: 65530,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.1,
            accel_x: 0.0,
            accel_y: 0.0,
            accel_z: 9.81,
            imu_fresh: 0,
            ir_fl: 1,
            ir_fr: 2,
            ir_l: 3,
            ir_r: 4,
            tof_mm: None,
            stop: 1,
            target_left: 1.0,
            target_right: -1.0,
        };
        let f = frame_from_row(&row);
        assert!(f.imu.is_none());
        assert!(f.stop);
        assert_eq!(f.counts.right, 65530);
        assert_eq!(f.ir.channels(), [1, 2, 3, 4]);
        assert_eq!(f.target, (1.0, -1.0));

        let fresh = frame_from_row(&TraceRow { imu_fresh: 1, ..row });
        assert_eq!(fresh.imu.map(|s| s.timestamp_us), Some(2000));
    }
}
