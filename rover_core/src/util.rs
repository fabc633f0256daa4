//! Common time/period helpers for rover_core.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Compute the period in microseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Compute the period in milliseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Number of whole ticks covering `window_ms`, rounded up and at least 1.
#[inline]
pub fn ticks_for_ms(window_ms: u64, period_us: u64) -> u32 {
    let window_us = window_ms.saturating_mul(MILLIS_PER_SEC);
    let ticks = window_us.div_ceil(period_us.max(1)).max(1);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

/// Tick period in seconds, as used by every per-tick integration.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn dt_seconds(period_us: u64) -> f32 {
    period_us as f32 / MICROS_PER_SEC as f32
}
