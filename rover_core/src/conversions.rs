//! `From` implementations bridging `rover_config` types to `rover_core` types.

use rover_config::IrChannel;

use crate::builder::RoverBuilder;
use crate::config::{
    BatteryCfg, DriveGeometry, EncoderCfg, FusionCfg, PidGains, ProximityCfg, SafetyCfg, Timeouts,
};

impl From<&rover_config::DriveCfg> for DriveGeometry {
    fn from(c: &rover_config::DriveCfg) -> Self {
        Self {
            wheel_radius_m: c.wheel_radius_m,
            wheelbase_m: c.wheelbase_m,
        }
    }
}

impl From<&rover_config::EncoderCfg> for EncoderCfg {
    fn from(c: &rover_config::EncoderCfg) -> Self {
        Self {
            counts_per_rev: c.counts_per_rev,
            gear_ratio: c.gear_ratio,
            counter_bits: c.counter_bits,
            invert_left: c.invert_left,
            invert_right: c.invert_right,
        }
    }
}

impl From<&rover_config::PidCfg> for PidGains {
    fn from(c: &rover_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            integral_limit: c.integral_limit,
            duty_limit: c.duty_limit,
            derivative_alpha: c.derivative_alpha,
        }
    }
}

impl From<&rover_config::FusionCfg> for FusionCfg {
    fn from(c: &rover_config::FusionCfg) -> Self {
        Self {
            alpha: c.alpha,
            max_gyro_rad_s: c.max_gyro_rad_s,
            max_accel_m_s2: c.max_accel_m_s2,
            gyro_bias_z: c.gyro_bias_z,
            bias_learn_rate: c.bias_learn_rate,
            stationary_rad_s: c.stationary_rad_s,
            level_gain: c.level_gain,
        }
    }
}

const fn channel_index(ch: IrChannel) -> usize {
    match ch {
        IrChannel::FrontLeft => 0,
        IrChannel::FrontRight => 1,
        IrChannel::Left => 2,
        IrChannel::Right => 3,
    }
}

impl From<&rover_config::ProximityCfg> for ProximityCfg {
    fn from(c: &rover_config::ProximityCfg) -> Self {
        let mut floor_mask = [false; 4];
        for ch in &c.floor_channels {
            floor_mask[channel_index(*ch)] = true;
        }
        Self {
            front_threshold: c.front_threshold,
            side_threshold: c.side_threshold,
            line_threshold: c.line_threshold,
            floor_mask,
            critical_range_mm: c.critical_range_mm,
            release_ticks: c.release_ticks,
            reduced_speed_ratio: c.reduced_speed_ratio,
        }
    }
}

impl From<&rover_config::Timeouts> for Timeouts {
    fn from(c: &rover_config::Timeouts) -> Self {
        Self {
            encoder_ms: c.encoder_ms,
            imu_ms: c.imu_ms,
            range_ms: c.range_ms,
            ir_ms: c.ir_ms,
        }
    }
}

impl From<&rover_config::Safety> for SafetyCfg {
    fn from(c: &rover_config::Safety) -> Self {
        Self {
            fault_limit_ticks: c.fault_limit_ticks,
            overrun_limit: c.overrun_limit,
        }
    }
}

impl From<&rover_config::BatteryCfg> for BatteryCfg {
    fn from(c: &rover_config::BatteryCfg) -> Self {
        Self {
            warn_v: c.warn_v,
            critical_v: c.critical_v,
        }
    }
}

impl<E, I, M> RoverBuilder<E, I, M> {
    /// Apply every tunable from a loaded configuration file.
    ///
    /// A persisted gyro calibration takes precedence over `fusion.gyro_bias_z`.
    /// The battery monitor itself still has to be attached separately; thresholds
    /// are applied only when `battery.enabled` is set.
    pub fn with_config(self, cfg: &rover_config::Config) -> Self {
        let fusion = FusionCfg {
            gyro_bias_z: cfg.gyro_bias_z(),
            ..FusionCfg::from(&cfg.fusion)
        };
        let b = self
            .with_rate_hz(cfg.control.rate_hz)
            .with_geometry((&cfg.drive).into())
            .with_encoder_cfg((&cfg.encoder).into())
            .with_pid((&cfg.pid).into())
            .with_fusion(fusion)
            .with_proximity((&cfg.proximity).into())
            .with_timeouts((&cfg.timeouts).into())
            .with_safety((&cfg.safety).into())
            .with_stop_debounce(cfg.safety.stop_debounce_n);
        if cfg.battery.enabled {
            b.with_battery((&cfg.battery).into())
        } else {
            b
        }
    }
}
