use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rover_core::pid::compute;
use rover_core::{DriveTarget, PidGains, PidState, Rover};
use rover_traits::{
    Encoders, HwResult, Imu, ImuSample, IrArray, IrReading, ManualClock, MotorBridge, RangeSensor,
    RawCounts,
};

// Counters advancing at a steady rate with a little xorshift jitter.
struct RampEncoders {
    counts: RawCounts,
    state: u32,
}

impl Encoders for RampEncoders {
    fn read_counts(&mut self) -> HwResult<RawCounts> {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        let jitter = x % 3;
        self.counts.left = self.counts.left.wrapping_add(9 + jitter);
        self.counts.right = self.counts.right.wrapping_add(11 - jitter);
        Ok(self.counts)
    }
}

struct SteadyImu(u64);

impl Imu for SteadyImu {
    fn latest(&mut self) -> HwResult<Option<ImuSample>> {
        self.0 += 2_000;
        Ok(Some(ImuSample {
            gyro: [0.0, 0.0, 0.3],
            accel: [0.0, 0.0, 9.81],
            timestamp_us: self.0,
        }))
    }
}

struct QuietIr;

impl IrArray for QuietIr {
    fn latest(&mut self) -> HwResult<Option<IrReading>> {
        Ok(Some(IrReading {
            front_left: 300,
            front_right: 320,
            left: 900,
            right: 880,
        }))
    }
}

struct FarRange;

impl RangeSensor for FarRange {
    fn latest_mm(&mut self) -> HwResult<Option<u16>> {
        Ok(Some(1_200))
    }
}

struct NullBridge;

impl MotorBridge for NullBridge {
    fn set_duty(&mut self, _left: f32, _right: f32) -> HwResult<()> {
        Ok(())
    }
    fn enable(&mut self) -> HwResult<()> {
        Ok(())
    }
    fn disable(&mut self) -> HwResult<()> {
        Ok(())
    }
}

fn rover() -> Rover {
    let mut r = Rover::builder()
        .with_encoders(RampEncoders {
            counts: RawCounts::default(),
            state: 0x9E37_79B9,
        })
        .with_imu(SteadyImu(0))
        .with_bridge(NullBridge)
        .with_ir(QuietIr)
        .with_range(FarRange)
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .expect("bench rover");
    r.enable().expect("enable");
    r.set_target(DriveTarget::new(12.0, 14.0));
    r
}

pub fn bench_tick(c: &mut Criterion) {
    c.bench_function("rover_tick_running", |b| {
        b.iter_batched_ref(
            rover,
            |r| {
                for _ in 0..100 {
                    black_box(r.tick());
                }
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("pid_compute", |b| {
        let gains = PidGains::default();
        b.iter(|| {
            let mut s = PidState::default();
            let mut duty = 0.0;
            for i in 0..256 {
                let (d, next) = compute(&gains, black_box(10.0), i as f32 * 0.05, 0.002, s);
                duty = d;
                s = next;
            }
            black_box(duty)
        });
    });
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
