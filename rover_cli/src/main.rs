mod atomic;
mod cli;
mod drive;
mod error_fmt;
mod replay;
mod rt;

use std::path::Path;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::drive::RunArgs;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
            tracing::debug!(error = ?err, "command failed");
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            linear,
            angular,
            max_ticks,
            fast,
            stream,
            stats,
            rt,
        } => {
            let shutdown = drive::shutdown_flag()?;
            let args = RunArgs {
                linear,
                angular,
                max_ticks,
                fast,
                stream,
                stats,
                json: cli.json,
                rt,
            };
            drive::run(&cfg, &args, shutdown)
        }
        Commands::Replay { trace } => replay::replay(&cfg, &trace, cli.json),
        Commands::CalibrateGyro { samples, out } => {
            drive::calibrate_gyro(&cfg, samples, out.as_deref(), cli.json)
        }
        Commands::SelfCheck => drive::self_check(&cfg, cli.json),
        Commands::Health => drive::health(&cfg, cli.json),
    }
}

fn load_config(path: &Path) -> Result<rover_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = rover_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout stays machine-readable. `RUST_LOG`
/// overrides `--log-level`; `[logging]` adds a JSON file sink.
fn init_tracing(json: bool, level: &str, logging: &rover_config::Logging) -> Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid --log-level {level:?}"))?,
    };
    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
            .wrap_err("invalid logging.level")?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("installing tracing subscriber")
}
