//! Human-readable error descriptions and structured JSON error formatting.

use rover_core::error::{BuildError, FaultCode, RoverError, Sensor};

use crate::cli::LAST_RUN;

/// Exit code for errors that are not a latched loop fault.
pub const EXIT_ERROR: i32 = 1;
/// Fault codes exit with this base plus the fault's numeric code.
pub const EXIT_FAULT_BASE: i32 = 10;

fn fault_of(err: &eyre::Report) -> Option<FaultCode> {
    match err.downcast_ref::<RoverError>() {
        Some(RoverError::Faulted(code)) => Some(*code),
        _ => err.downcast_ref::<FaultCode>().copied(),
    }
}

fn humanize_fault(code: FaultCode) -> String {
    match code {
        FaultCode::SensorStale(Sensor::Encoders) => "What happened: Encoder counts stopped arriving and the loop faulted (SensorStale).\nLikely causes: Encoder timer not running, loose L_ENC/R_ENC wiring, or timeouts.encoder_ms too tight for the control rate.\nHow to fix: Check the quadrature lines, then raise timeouts.encoder_ms or lower control.rate_hz.".to_string(),
        FaultCode::SensorStale(sensor) => format!(
            "What happened: The {sensor} stopped delivering samples and the loop faulted (SensorStale).\nLikely causes: Sensor not powered, bus error, or timeouts.{sensor}_ms shorter than the sensor's output period.\nHow to fix: Check the sensor wiring and power, or raise timeouts.{sensor}_ms."
        ),
        FaultCode::SensorOutOfRange(sensor) => format!(
            "What happened: The {sensor} kept reporting physically impossible values (SensorOutOfRange).\nLikely causes: Wrong full-scale setting, mechanical shock, or a failing part.\nHow to fix: Verify the sensor configuration, or widen fusion.max_gyro_rad_s / fusion.max_accel_m_s2 if the limits are too strict."
        ),
        FaultCode::LoopOverrun => "What happened: Control ticks kept exceeding their period (LoopOverrun).\nLikely causes: Control rate too high for this machine, blocking sensor reads, or a loaded CPU.\nHow to fix: Lower control.rate_hz, use runner.mode = \"sampled\" for the ToF, or run with --rt.".to_string(),
        FaultCode::ExplicitStop => "What happened: The supervisor requested an explicit stop (ExplicitStop).\nLikely causes: A halt command was issued.\nHow to fix: Reset the loop and enable it again when it is safe to move.".to_string(),
        FaultCode::ActuatorFault => "What happened: Writes to the motor bridge kept failing (ActuatorFault).\nLikely causes: H-bridge not powered, MOTORS_EN stuck, or a PWM driver error.\nHow to fix: Check bridge power and the LMOTOR/RMOTOR lines, then reset.".to_string(),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(code) = fault_of(err) {
        return humanize_fault(code);
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEncoders => "What happened: No encoders were provided to the control loop.\nLikely causes: Encoder driver failed to initialize or was not wired into the builder.\nHow to fix: Pass the encoders via with_encoders(...).".to_string(),
            BuildError::MissingImu => "What happened: No IMU was provided to the control loop.\nLikely causes: IMU driver failed to initialize or was not wired into the builder.\nHow to fix: Pass the IMU via with_imu(...).".to_string(),
            BuildError::MissingBridge => "What happened: No motor bridge was provided to the control loop.\nLikely causes: PWM driver failed to initialize or was not wired into the builder.\nHow to fix: Pass the bridge via with_bridge(...).".to_string(),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RoverError>() {
        if matches!(re, RoverError::Timeout) {
            return "What happened: A sensor read timed out.\nLikely causes: Device not powered or bus wiring issue.\nHow to fix: Check the sensor wiring and power, then retry.".to_string();
        }
        return format!(
            "What happened: {re}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    if let Some(io) = err.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::NotFound
    {
        return format!(
            "What happened: A file could not be found ({err}).\nLikely causes: Wrong --config or --trace path, or running from another directory.\nHow to fix: Pass the full path, e.g. `rover --config etc/rover.toml ...`."
        );
    }

    if err.downcast_ref::<toml::de::Error>().is_some() {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: Missing [drive] or [encoder] section, a typo in a key, or a wrong value type.\nHow to fix: Compare with etc/rover.toml. Parser said: {}",
            err.root_cause()
        );
    }

    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("trace csv must have headers") {
        return format!(
            "Invalid headers in trace CSV. Expected '{}'.",
            rover_config::TRACE_HEADERS.join(",")
        );
    }

    if lower.contains("must be") || lower.contains("unreasonably") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: An out-of-range value in the TOML ({msg}).\nHow to fix: Edit the config file and try again."
        );
    }

    if lower.contains("pin map") {
        return format!(
            "What happened: The board pin map is inconsistent.\nLikely causes: {msg}.\nHow to fix: Fix the pin table before flashing."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Latched faults get stable exit codes (10 + fault code); everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    fault_of(err).map_or(EXIT_ERROR, |code| {
        EXIT_FAULT_BASE + i32::from(code.code())
    })
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let message = humanize(err);
    let Some(code) = fault_of(err) else {
        return json!({ "reason": "Error", "message": message }).to_string();
    };

    let mut obj = json!({
        "reason": code.name(),
        "code": code.code(),
        "message": message,
    });
    if let FaultCode::SensorStale(s) | FaultCode::SensorOutOfRange(s) = code {
        obj["sensor"] = json!(s.name());
    }
    if let Some(ctx) = LAST_RUN.get() {
        obj["details"] = json!({
            "ticks": ctx.ticks,
            "rate_hz": ctx.rate_hz,
            "fault_limit_ticks": ctx.fault_limit_ticks,
            "overrun_limit": ctx.overrun_limit,
        });
    }
    obj.to_string()
}
