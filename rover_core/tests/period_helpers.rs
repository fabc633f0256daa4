use rover_core::util::{dt_seconds, period_ms, period_us, ticks_for_ms};

#[test]
fn period_us_basic() {
    assert_eq!(period_us(500), 2_000);
    assert_eq!(period_us(1), 1_000_000);
    assert_eq!(period_us(0), 1_000_000, "zero rate clamps to 1 Hz");
    assert_eq!(period_us(2_000_000), 1, "never below one microsecond");
}

#[test]
fn period_ms_basic() {
    assert_eq!(period_ms(10), 100);
    assert_eq!(period_ms(0), 1_000);
    assert_eq!(period_ms(5_000), 1);
}

#[test]
fn ticks_for_ms_rounds_up() {
    assert_eq!(ticks_for_ms(5, 2_000), 3);
    assert_eq!(ticks_for_ms(10, 2_000), 5);
    assert_eq!(ticks_for_ms(0, 2_000), 1);
    assert_eq!(ticks_for_ms(200, 0), 200_000);
    assert_eq!(ticks_for_ms(u64::MAX, 1), u32::MAX);
}

#[test]
fn dt_matches_period() {
    assert!((dt_seconds(2_000) - 0.002).abs() < f32::EPSILON);
    assert!((dt_seconds(period_us(250)) - 0.004).abs() < f32::EPSILON);
}
