use proptest::prelude::*;
use rover_core::pid::compute;
use rover_core::{MotorPid, PidGains, PidState};
use rstest::rstest;

proptest! {
    #[test]
    fn duty_never_exceeds_limit(
        kp in 0.0f32..10.0,
        ki in 0.0f32..10.0,
        kd in 0.0f32..1.0,
        limit in 0.05f32..=1.0,
        targets in prop::collection::vec(-200.0f32..200.0, 1..50),
        measured in -200.0f32..200.0,
    ) {
        let gains = PidGains { kp, ki, kd, duty_limit: limit, ..PidGains::default() };
        let mut state = PidState::default();
        for t in targets {
            let (duty, next) = compute(&gains, t, measured, 0.002, state);
            prop_assert!(duty.abs() <= limit + f32::EPSILON);
            prop_assert!(next.integral.abs() <= gains.integral_limit + f32::EPSILON);
            state = next;
        }
    }
}

#[rstest]
fn integral_freezes_while_saturated() {
    let gains = PidGains {
        kp: 1.0,
        ki: 1.0,
        kd: 0.0,
        integral_limit: 100.0,
        duty_limit: 1.0,
        ..PidGains::default()
    };
    let mut pid = MotorPid::new(gains);
    for _ in 0..1000 {
        pid.update(50.0, 0.0, 0.01);
        assert!(pid.state().saturated);
    }
    assert_eq!(pid.state().integral, 0.0, "no accumulation while pinned at the clamp");
}

#[rstest]
fn no_windup_overshoot_after_saturation_clears() {
    let gains = PidGains {
        kp: 0.05,
        ki: 0.5,
        kd: 0.0,
        integral_limit: 1.5,
        duty_limit: 1.0,
        ..PidGains::default()
    };
    let mut pid = MotorPid::new(gains);
    for _ in 0..500 {
        pid.update(40.0, 0.0, 0.002);
    }
    // Error is now zero: the output must fall back inside the clamp at once.
    let duty = pid.update(40.0, 40.0, 0.002);
    assert!(duty < 1.0, "held at the clamp after the error vanished: {duty}");
    assert!(pid.state().integral <= gains.integral_limit);
}

#[rstest]
#[case(0.3, 42.0, false)]
#[case(-0.7, -5.0, false)]
#[case(1.8, 12.5, true)]
#[case(-1.9, 0.0, true)]
fn zero_error_leaves_integral_untouched(
    #[case] integral: f32,
    #[case] speed: f32,
    #[case] saturated: bool,
) {
    let gains = PidGains {
        kp: 0.4,
        ki: 1.0,
        kd: 0.01,
        integral_limit: 2.0,
        duty_limit: 1.0,
        ..PidGains::default()
    };
    let mut state = PidState {
        integral,
        primed: true,
        ..PidState::default()
    };
    for step in 0..2000 {
        let (duty, next) = compute(&gains, speed, speed, 0.002, state);
        assert_eq!(
            next.integral.to_bits(),
            integral.to_bits(),
            "integral moved on step {step}"
        );
        assert_eq!(next.saturated, saturated, "step {step}");
        assert!(duty.abs() <= gains.duty_limit);
        state = next;
    }
}

#[rstest]
#[case(f32::NAN, 0.0, 0.002)]
#[case(1.0, f32::INFINITY, 0.002)]
#[case(1.0, 0.0, -0.002)]
fn bad_inputs_give_zero_duty(#[case] target: f32, #[case] measured: f32, #[case] dt: f32) {
    let mut pid = MotorPid::new(PidGains::default());
    pid.update(5.0, 0.0, 0.002);
    let before = *pid.state();
    assert_eq!(pid.update(target, measured, dt), 0.0);
    assert_eq!(*pid.state(), before);
}

#[rstest]
fn steady_error_builds_integral_in_its_direction() {
    let mut pid = MotorPid::new(PidGains::default());
    for _ in 0..10 {
        pid.update(-1.0, 0.0, 0.002);
    }
    assert!(pid.state().integral < 0.0);
    assert!(!pid.state().saturated);
}
