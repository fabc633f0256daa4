//! Counter and angle arithmetic shared by the estimators.

use std::f32::consts::{PI, TAU};

/// Signed difference `current - previous` of a free-running counter of
/// `bits` width, mapped into `[-2^(bits-1), 2^(bits-1))`.
///
/// Both inputs are masked to the counter width first, so callers may pass the
/// raw register value.
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub fn wrap_delta(previous: u32, current: u32, bits: u8) -> i64 {
    let bits = u32::from(bits.clamp(1, 32));
    let modulus = 1u64 << bits;
    let mask = modulus - 1;
    let prev = u64::from(previous) & mask;
    let cur = u64::from(current) & mask;
    let d = cur.wrapping_sub(prev) & mask;
    if d >= modulus / 2 {
        d as i64 - modulus as i64
    } else {
        d as i64
    }
}

/// Mask a raw register value to the counter width.
#[inline]
pub fn mask_counter(raw: u32, bits: u8) -> u32 {
    if bits >= 32 {
        raw
    } else {
        raw & ((1u32 << bits) - 1)
    }
}

/// Wrap an angle into `(-π, π]`.
///
/// Values already in range are returned bit-identical.
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { PI } else { wrapped.min(PI) }
}

/// Shortest signed rotation from `from` to `to`, in `(-π, π]`.
#[inline]
pub fn angle_diff(to: f32, from: f32) -> f32 {
    normalize_angle(to - from)
}

/// Clamp into `[-limit, limit]`; NaN maps to 0.
#[inline]
pub fn clamp_symmetric(v: f32, limit: f32) -> f32 {
    let limit = limit.abs();
    if v.is_nan() { 0.0 } else { v.clamp(-limit, limit) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_delta_16bit_crossings() {
        assert_eq!(wrap_delta(65_530, 4, 16), 10);
        assert_eq!(wrap_delta(4, 65_530, 16), -10);
        assert_eq!(wrap_delta(100, 100, 16), 0);
        // exactly half the range maps to the negative end
        assert_eq!(wrap_delta(0, 32_768, 16), -32_768);
        assert_eq!(wrap_delta(0, 32_767, 16), 32_767);
    }

    #[test]
    fn wrap_delta_32bit_extremes() {
        assert_eq!(wrap_delta(u32::MAX, 0, 32), 1);
        assert_eq!(wrap_delta(0, u32::MAX, 32), -1);
        assert_eq!(wrap_delta(0, 0x8000_0000, 32), -(1i64 << 31));
    }

    #[test]
    fn wrap_delta_ignores_bits_above_width() {
        assert_eq!(wrap_delta(0x1_0005, 0x2_0007, 16), 2);
    }

    #[test]
    fn normalize_keeps_in_range_values() {
        for a in [0.0f32, 0.1, -0.1, 3.0, -3.0, PI] {
            assert_eq!(normalize_angle(a).to_bits(), a.to_bits());
        }
    }

    #[test]
    fn normalize_maps_negative_pi_to_pi() {
        assert_eq!(normalize_angle(-PI), PI);
    }

    #[test]
    fn normalize_wraps_large_angles() {
        let a = normalize_angle(3.0 * PI + 0.5);
        assert!(a > -PI && a <= PI);
        assert!((a - (-PI + 0.5)).abs() < 1e-4);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
    }

    #[test]
    fn angle_diff_takes_short_way_round() {
        let d = angle_diff(-3.1, 3.1);
        assert!((d - (TAU - 6.2)).abs() < 1e-5);
    }

    #[test]
    fn clamp_symmetric_handles_nan() {
        assert_eq!(clamp_symmetric(f32::NAN, 1.0), 0.0);
        assert_eq!(clamp_symmetric(2.0, 1.0), 1.0);
        assert_eq!(clamp_symmetric(-2.0, -0.5), -0.5);
    }
}
