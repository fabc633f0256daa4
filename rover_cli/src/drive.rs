//! Closed-loop commands against the simulated robot: run, calibrate-gyro,
//! self-check and health.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use rover_config::{Config, PersistedImuCalibration, RunMode};
use rover_core::error::Result;
use rover_core::hw_error::map_hw_error;
use rover_core::runner::{RunOptions, RunSummary};
use rover_core::util::{dt_seconds, period_us};
use rover_core::{DriveTarget, Rover, Sampler, TickReport};
use rover_hardware::{SimParams, SimRobot, pins};
use rover_traits::{Clock, Encoders, HwResult, Imu, ManualClock, MonotonicClock, RangeSensor};
use serde_json::json;

use crate::atomic::write_atomic;
use crate::cli::{LAST_RUN, RtArgs, RunContext};
use crate::rt::setup_rt_once;

/// Environment knobs that make the simulated hardware misbehave.
const ENV_ENCODER_FAIL: &str = "ROVER_TEST_SIM_ENCODER_FAIL";
const ENV_IMU_SPIKES: &str = "ROVER_TEST_SIM_IMU_SPIKES";
const ENV_BRIDGE_FAIL: &str = "ROVER_TEST_SIM_BRIDGE_FAIL";

/// Idle ticks the health probe runs before reporting.
const HEALTH_TICKS: u64 = 50;

pub struct RunArgs {
    pub linear: f32,
    pub angular: f32,
    pub max_ticks: Option<u64>,
    pub fast: bool,
    pub stream: bool,
    pub stats: bool,
    pub json: bool,
    pub rt: RtArgs,
}

#[allow(clippy::cast_precision_loss)]
pub fn sim_params(cfg: &Config) -> SimParams {
    let rate_hz = cfg.control.rate_hz.max(1);
    SimParams {
        dt_s: dt_seconds(period_us(rate_hz)),
        wheel_radius_m: cfg.drive.wheel_radius_m,
        wheelbase_m: cfg.drive.wheelbase_m,
        counts_per_wheel_rev: cfg.encoder.counts_per_rev as f32 * cfg.encoder.gear_ratio,
        counter_bits: cfg.encoder.counter_bits,
        motor_tau_s: cfg.sim.motor_tau_s,
        max_wheel_rad_s: cfg.sim.max_wheel_rad_s,
        wall_distance_m: cfg.sim.wall_distance_m,
        gyro_bias_z: cfg.sim.gyro_bias_z,
        battery_v: cfg.sim.battery_v,
        range_every: (rate_hz / cfg.runner.range_hz.max(1)).max(1),
    }
}

fn env_count(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn inject_faults(sim: &SimRobot) {
    if let Some(n) = env_count(ENV_ENCODER_FAIL) {
        tracing::warn!(n, "sim: failing encoder reads");
        sim.fail_encoder_reads(n);
    }
    if let Some(n) = env_count(ENV_IMU_SPIKES) {
        tracing::warn!(n, "sim: spiking imu samples");
        sim.spike_imu(n);
    }
    if let Some(n) = env_count(ENV_BRIDGE_FAIL) {
        tracing::warn!(n, "sim: failing bridge writes");
        sim.fail_bridge_writes(n);
    }
}

/// Wire a Rover onto the simulated robot.
///
/// With `runner.mode = "sampled"` the ToF is read on its own thread; the
/// sampler keeps wall-clock time even when the loop runs on virtual time.
fn build_sim_rover(
    cfg: &Config,
    sim: &SimRobot,
    clock: Box<dyn Clock + Send + Sync>,
) -> Result<Rover> {
    let builder = Rover::builder()
        .with_config(cfg)
        .with_encoders(sim.encoders())
        .with_imu(sim.imu())
        .with_bridge(sim.bridge())
        .with_ir(sim.ir())
        .with_leds(sim.leds())
        .with_clock(clock);
    let builder = if cfg.battery.enabled {
        builder.with_battery_monitor(sim.battery())
    } else {
        builder
    };
    let builder = match cfg.runner.mode {
        RunMode::Direct => builder.with_range(sim.range()),
        RunMode::Sampled => {
            let mut range = sim.range();
            let sampler = Sampler::spawn(
                move || -> HwResult<Option<u16>> { range.latest_mm() },
                cfg.runner.range_hz,
                Arc::new(MonotonicClock::new()),
            );
            tracing::info!(range_hz = cfg.runner.range_hz, "tof sampled on background thread");
            builder.with_range(sampler)
        }
    };
    builder.build()
}

fn loop_clock(fast: bool) -> Box<dyn Clock + Send + Sync> {
    if fast {
        Box::new(ManualClock::new())
    } else {
        Box::new(MonotonicClock::new())
    }
}

fn tick_json(r: &TickReport) -> serde_json::Value {
    json!({
        "tick": r.tick,
        "state": r.state.name(),
        "hazard": r.hazard.name(),
        "x": r.pose.x,
        "y": r.pose.y,
        "heading": r.pose.heading,
        "left_duty": r.command.left_duty,
        "right_duty": r.command.right_duty,
        "valid": r.command.valid,
        "saturated": r.saturated,
        "low_battery": r.low_battery,
        "overrun": r.flags.overrun,
        "elapsed_us": r.elapsed_us,
    })
}

fn summary_json(s: &RunSummary) -> serde_json::Value {
    json!({
        "ticks": s.ticks,
        "overruns": s.overruns,
        "missed_deadlines": s.missed_deadlines,
        "latency_us": {
            "min": s.min_latency_us,
            "avg": s.avg_latency_us,
            "max": s.max_latency_us,
        },
        "final_state": s.final_state.name(),
        "reason": format!("{:?}", s.reason),
        "pose": { "x": s.pose.x, "y": s.pose.y, "heading": s.pose.heading },
    })
}

fn print_stats(s: &RunSummary, rate_hz: u32) {
    eprintln!("\n--- Rover Stats ---");
    eprintln!("Ticks: {}", s.ticks);
    eprintln!("Period (us): {}", period_us(rate_hz));
    eprintln!(
        "Latency min/avg/max (us): {} / {} / {}",
        s.min_latency_us, s.avg_latency_us, s.max_latency_us
    );
    eprintln!("Overruns (> period): {}", s.overruns);
    eprintln!("Missed deadlines: {}", s.missed_deadlines);
    eprintln!("-------------------\n");
}

/// `run`: hold a constant twist on the simulated robot until the tick budget,
/// Ctrl-C or a latched fault.
pub fn run(cfg: &Config, args: &RunArgs, shutdown: Arc<AtomicBool>) -> Result<()> {
    setup_rt_once(&args.rt);

    let sim = SimRobot::new(sim_params(cfg));
    inject_faults(&sim);
    let mut rover = build_sim_rover(cfg, &sim, loop_clock(args.fast))?;
    let target = DriveTarget::from_twist(args.linear, args.angular, rover.geometry());
    rover.set_target(target);
    tracing::info!(
        linear = args.linear,
        angular = args.angular,
        left = target.left,
        right = target.right,
        fast = args.fast,
        "run start"
    );

    let opts = RunOptions {
        max_ticks: args.max_ticks,
        shutdown: Some(shutdown),
        enable: true,
    };
    let stream = args.stream && args.json;
    let mut last_tick = 0;
    let outcome = rover_core::run(&mut rover, &opts, |report| {
        last_tick = report.tick;
        if stream {
            println!("{}", tick_json(report));
        }
        None
    });
    let _ = LAST_RUN.set(RunContext {
        ticks: last_tick,
        rate_hz: cfg.control.rate_hz,
        fault_limit_ticks: cfg.safety.fault_limit_ticks,
        overrun_limit: cfg.safety.overrun_limit,
    });
    let summary = outcome.wrap_err("control loop")?;

    if args.stats {
        print_stats(&summary, cfg.control.rate_hz);
    }
    if args.json {
        let mut obj = summary_json(&summary);
        obj["truth"] = json!({ "x": sim.state().x, "y": sim.state().y });
        println!("{obj}");
    } else {
        println!(
            "run complete: {} ticks, state {}, pose x={:.3} m y={:.3} m heading={:.3} rad",
            summary.ticks,
            summary.final_state.name(),
            summary.pose.x,
            summary.pose.y,
            summary.pose.heading
        );
    }
    Ok(())
}

/// Average `samples` stationary gyro readings from the simulated IMU.
pub fn collect_gyro_samples(sim: &SimRobot, samples: u32) -> Result<Vec<[f32; 3]>> {
    let mut encoders = sim.encoders();
    let mut imu = sim.imu();
    let mut out = Vec::with_capacity(samples as usize);
    // Each encoder read advances the plant one step, so every poll sees a new sample.
    while out.len() < samples as usize {
        encoders
            .read_counts()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("stepping encoders during calibration")?;
        let sample = imu
            .latest()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading imu during calibration")?;
        if let Some(s) = sample {
            out.push(s.gyro);
        }
    }
    Ok(out)
}

/// `calibrate-gyro`: estimate the bias at rest and persist it.
pub fn calibrate_gyro(cfg: &Config, samples: u32, out: Option<&Path>, json: bool) -> Result<()> {
    let sim = SimRobot::new(sim_params(cfg));
    let readings = collect_gyro_samples(&sim, samples)?;
    let cal = PersistedImuCalibration::from_samples(&readings)?;
    let table = cal.to_toml()?;
    tracing::info!(bias_z = cal.gyro_bias[2], samples = cal.samples, "gyro bias estimated");

    match out {
        Some(path) => {
            write_atomic(path, table.as_bytes())
                .wrap_err_with(|| format!("writing calibration to {}", path.display()))?;
            if json {
                println!(
                    "{}",
                    json!({ "gyro_bias": cal.gyro_bias, "samples": cal.samples, "path": path.display().to_string() })
                );
            } else {
                println!(
                    "gyro bias z = {:.6} rad/s from {} samples, written to {}",
                    cal.gyro_bias[2],
                    cal.samples,
                    path.display()
                );
            }
        }
        None => print!("{table}"),
    }
    Ok(())
}

/// `self-check`: configuration (already validated on load), pin map, and a
/// trial build of the loop on the simulated robot.
pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let problems = pins::check();
    if !problems.is_empty() {
        eyre::bail!("pin map: {}", problems.join("; "));
    }
    let sim = SimRobot::new(sim_params(cfg));
    build_sim_rover(cfg, &sim, Box::new(ManualClock::new())).wrap_err("building control loop")?;
    if json {
        println!(
            "{}",
            json!({ "status": "ok", "pins": pins::REQUIRED.len(), "rate_hz": cfg.control.rate_hz })
        );
    } else {
        println!("self-check ok ({} required lines mapped)", pins::REQUIRED.len());
    }
    Ok(())
}

/// `health`: run the loop idle for a moment and report what it sensed.
pub fn health(cfg: &Config, json: bool) -> Result<()> {
    let sim = SimRobot::new(sim_params(cfg));
    let clock = ManualClock::new();
    let mut rover = build_sim_rover(cfg, &sim, Box::new(clock.clone()))?;
    let period = std::time::Duration::from_micros(rover.period_us());
    let mut last = None;
    for _ in 0..HEALTH_TICKS {
        last = Some(rover.tick());
        clock.advance(period);
    }
    let Some(report) = last else {
        eyre::bail!("health probe ran no ticks");
    };
    let f = report.flags;
    let stale: Vec<&str> = [
        ("encoders", f.encoders_stale),
        ("imu", f.imu_stale),
        ("range", f.range_stale),
        ("ir", f.ir_stale),
    ]
    .into_iter()
    .filter_map(|(name, s)| s.then_some(name))
    .collect();
    let status = if stale.is_empty() && !f.imu_rejected { "ok" } else { "degraded" };
    let battery_v = sim.state().battery_v;
    if json {
        println!(
            "{}",
            json!({
                "status": status,
                "state": report.state.name(),
                "hazard": report.hazard.name(),
                "stale": stale,
                "battery_v": battery_v,
                "gyro_bias_z": rover.gyro_bias_z(),
            })
        );
    } else {
        println!(
            "health {status}: state {}, hazard {}, battery {battery_v:.2} V{}",
            report.state.name(),
            report.hazard.name(),
            if stale.is_empty() {
                String::new()
            } else {
                format!(", stale: {}", stale.join(","))
            }
        );
    }
    Ok(())
}

/// Install the Ctrl-C handler that asks the loop to finish its current tick.
pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        f.store(true, Ordering::Relaxed);
    })
    .wrap_err("installing Ctrl-C handler")?;
    Ok(flag)
}
