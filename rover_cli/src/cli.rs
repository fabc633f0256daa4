//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Loop state reached by the last run, for JSON error details.
pub static LAST_RUN: OnceLock<RunContext> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct RunContext {
    pub ticks: u64,
    pub rate_hz: u32,
    pub fault_limit_ticks: u32,
    pub overrun_limit: u32,
}

#[derive(Parser, Debug)]
#[command(name = "rover", version, about = "Differential-drive rover motion core")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/rover.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            RtLock::Current
        } else {
            RtLock::None
        }
    }
}

/// Real-time scheduling knobs shared by the loop-driving commands.
#[derive(Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: attempts SCHED_FIFO priority, pins the process to one CPU and locks memory with mlockall. This reduces page faults and scheduling jitter in the control loop but may need CAP_SYS_NICE, CAP_IPC_LOCK or a raised 'ulimit -l'.\n\nmacOS: only mlockall is applied."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO on Linux (1..=max); ignored on macOS
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the process to (Linux only). Defaults to 0.
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the simulated robot in closed loop
    Run {
        /// Forward speed setpoint in m/s
        #[arg(long, default_value_t = 0.2, allow_negative_numbers = true)]
        linear: f32,
        /// Turn rate setpoint in rad/s
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        angular: f32,
        /// Stop after this many control ticks (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Run on virtual time: no sleeping between ticks
        #[arg(long, action = ArgAction::SetTrue)]
        fast: bool,
        /// Emit one JSON line per tick (with --json)
        #[arg(long, action = ArgAction::SetTrue)]
        stream: bool,
        /// Print control loop latency stats
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Replay a recorded CSV trace through the control loop
    Replay {
        /// Trace CSV (strict header)
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
    },
    /// Estimate the stationary gyro bias and persist it as a [calibration] table
    CalibrateGyro {
        /// Number of stationary samples to average
        #[arg(long, default_value_t = 500)]
        samples: u32,
        /// Write the table here (atomically) instead of printing it
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Validate the configuration and the board pin map
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
