//! Quadrature counter decoding.
//!
//! Turns the two free-running hardware counters into signed per-tick deltas and
//! wheel angular velocity. The decoder never divides by a zero or non-finite
//! period; such ticks report zero velocity with `stale = true`. After missed
//! reads the next delta spans several periods and is averaged over all of them.

use std::f32::consts::TAU;

use rover_traits::RawCounts;

use crate::config::EncoderCfg;
use crate::math::{mask_counter, wrap_delta};
use crate::types::{Side, WheelState};

#[derive(Debug, Clone)]
pub struct EncoderDecoder {
    cfg: EncoderCfg,
    rad_per_count: f32,
    prev: Option<[u32; 2]>,
    /// Reads missed since `prev` was taken.
    missed: u32,
    last_tick: Option<u64>,
    wheels: [WheelState; 2],
}

impl EncoderDecoder {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(cfg: EncoderCfg) -> Self {
        let counts_per_wheel_rev = cfg.counts_per_rev as f32 * cfg.gear_ratio;
        let rad_per_count = if counts_per_wheel_rev.is_finite() && counts_per_wheel_rev > 0.0 {
            TAU / counts_per_wheel_rev
        } else {
            0.0
        };
        Self {
            cfg,
            rad_per_count,
            prev: None,
            missed: 0,
            last_tick: None,
            wheels: [WheelState::new(Side::Left), WheelState::new(Side::Right)],
        }
    }

    /// Decode one pair of counter readings taken at scheduler tick `tick`.
    ///
    /// The first call after construction or [`reset`](Self::reset) only primes
    /// the previous counts.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, raw: RawCounts, dt: f32, tick: u64) -> [WheelState; 2] {
        let bits = self.cfg.counter_bits;
        let cur = [mask_counter(raw.left, bits), mask_counter(raw.right, bits)];

        if self.last_tick == Some(tick) {
            for w in &mut self.wheels {
                w.delta_ticks = 0;
                w.angular_velocity = 0.0;
                w.stale = true;
            }
            tracing::trace!(tick, "encoder update repeated within one tick");
            return self.wheels;
        }
        self.last_tick = Some(tick);

        let missed = std::mem::take(&mut self.missed);
        let Some(prev) = self.prev.replace(cur) else {
            for (w, c) in self.wheels.iter_mut().zip(cur) {
                w.raw_count = c;
                w.delta_ticks = 0;
                w.angular_velocity = 0.0;
                w.stale = true;
            }
            return self.wheels;
        };

        let span = dt * (missed as f32 + 1.0);
        let dt_ok = span.is_finite() && span > 0.0;
        let invert = [self.cfg.invert_left, self.cfg.invert_right];
        for (i, w) in self.wheels.iter_mut().enumerate() {
            let mut delta = wrap_delta(prev[i], cur[i], bits);
            if invert[i] {
                delta = -delta;
            }
            w.raw_count = cur[i];
            w.delta_ticks = delta;
            w.position_ticks = w.position_ticks.saturating_add(delta);
            if dt_ok {
                w.angular_velocity = delta as f32 * self.rad_per_count / span;
                w.stale = false;
            } else {
                w.angular_velocity = 0.0;
                w.stale = true;
            }
        }
        self.wheels
    }

    /// Keep the last good velocity but mark it stale (missed read).
    ///
    /// The missed period is folded into the next decoded delta.
    pub fn hold(&mut self) -> [WheelState; 2] {
        if self.prev.is_some() {
            self.missed = self.missed.saturating_add(1);
        }
        for w in &mut self.wheels {
            w.delta_ticks = 0;
            w.stale = true;
        }
        self.wheels
    }

    /// Forget the previous counts so the next update primes again.
    ///
    /// Unwrapped positions are kept.
    pub fn reset(&mut self) {
        self.prev = None;
        self.missed = 0;
        self.last_tick = None;
        for w in &mut self.wheels {
            w.delta_ticks = 0;
            w.angular_velocity = 0.0;
            w.stale = true;
        }
    }

    pub fn wheels(&self) -> &[WheelState; 2] {
        &self.wheels
    }

    /// Radians of wheel rotation per decoded count.
    pub fn rad_per_count(&self) -> f32 {
        self.rad_per_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> EncoderDecoder {
        EncoderDecoder::new(EncoderCfg {
            counts_per_rev: 100,
            gear_ratio: 1.0,
            counter_bits: 16,
            invert_left: false,
            invert_right: false,
        })
    }

    #[test]
    fn first_sample_primes() {
        let mut d = decoder();
        let w = d.update(RawCounts { left: 10, right: 20 }, 0.01, 0);
        assert!(w[0].stale && w[1].stale);
        assert_eq!(w[0].angular_velocity, 0.0);
        assert_eq!(w[1].raw_count, 20);
    }

    #[test]
    fn converts_counts_to_rad_per_second() {
        let mut d = decoder();
        d.update(RawCounts::default(), 0.01, 0);
        let w = d.update(RawCounts { left: 100, right: 50 }, 0.01, 1);
        assert!(!w[0].stale);
        assert!((w[0].angular_velocity - TAU / 0.01).abs() < 1e-2);
        assert!((w[1].angular_velocity - TAU / 0.02).abs() < 1e-2);
        assert_eq!(w[0].position_ticks, 100);
    }

    #[test]
    fn repeated_tick_is_stale_and_does_not_advance() {
        let mut d = decoder();
        d.update(RawCounts::default(), 0.01, 0);
        d.update(RawCounts { left: 5, right: 5 }, 0.01, 1);
        let w = d.update(RawCounts { left: 9, right: 9 }, 0.01, 1);
        assert!(w[0].stale);
        assert_eq!(w[0].angular_velocity, 0.0);
        assert_eq!(w[0].position_ticks, 5);
        // the ignored reading did not move the reference
        let w = d.update(RawCounts { left: 9, right: 9 }, 0.01, 2);
        assert_eq!(w[0].delta_ticks, 4);
    }

    #[test]
    fn zero_period_reports_zero_velocity() {
        let mut d = decoder();
        d.update(RawCounts::default(), 0.01, 0);
        let w = d.update(RawCounts { left: 7, right: 7 }, 0.0, 1);
        assert!(w[0].stale);
        assert_eq!(w[0].angular_velocity, 0.0);
        assert_eq!(w[0].delta_ticks, 7);
    }

    #[test]
    fn inversion_negates_one_side() {
        let mut d = EncoderDecoder::new(EncoderCfg {
            invert_left: true,
            ..EncoderCfg::default()
        });
        d.update(RawCounts::default(), 0.01, 0);
        let w = d.update(RawCounts { left: 3, right: 3 }, 0.01, 1);
        assert_eq!(w[0].delta_ticks, -3);
        assert_eq!(w[1].delta_ticks, 3);
    }

    #[test]
    fn hold_keeps_velocity_and_flags_stale() {
        let mut d = decoder();
        d.update(RawCounts::default(), 0.01, 0);
        let before = d.update(RawCounts { left: 10, right: 10 }, 0.01, 1);
        let held = d.hold();
        assert!(held[0].stale);
        assert_eq!(held[0].angular_velocity, before[0].angular_velocity);
    }

    #[test]
    fn delta_after_missed_reads_is_averaged_over_the_gap() {
        let mut d = decoder();
        d.update(RawCounts::default(), 0.002, 0);
        let steady = d.update(RawCounts { left: 10, right: 10 }, 0.002, 1);
        d.hold();
        d.hold();
        // three periods of travel since the last good read
        let w = d.update(RawCounts { left: 40, right: 40 }, 0.002, 4);
        assert!(!w[0].stale);
        assert_eq!(w[0].delta_ticks, 30);
        assert!((w[0].angular_velocity - steady[0].angular_velocity).abs() < 1e-2);
        // the gap is consumed by one update
        let w = d.update(RawCounts { left: 50, right: 50 }, 0.002, 5);
        assert!((w[0].angular_velocity - steady[0].angular_velocity).abs() < 1e-2);
    }

    #[test]
    fn hold_before_priming_does_not_stretch_the_first_delta() {
        let mut d = decoder();
        d.hold();
        d.update(RawCounts::default(), 0.01, 1);
        let w = d.update(RawCounts { left: 100, right: 100 }, 0.01, 2);
        assert!((w[0].angular_velocity - TAU / 0.01).abs() < 1e-2);
    }
}
