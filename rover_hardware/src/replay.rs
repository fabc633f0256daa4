//! Recorded-trace playback.
//!
//! A [`ReplayDeck`] serves one [`Frame`] per control tick. Reading the encoders
//! advances the cursor; every other collaborator reads the frame under the
//! cursor, so a tick that polls encoders first sees a consistent snapshot.
//! Duty writes are captured for later comparison against the recording.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rover_traits::{
    Encoders, HwResult, Imu, ImuSample, IrArray, IrReading, MotorBridge, RangeSensor, RawCounts,
};

use crate::error::HwError;

/// Everything the loop can observe during one recorded tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frame {
    pub t_us: u64,
    pub counts: RawCounts,
    /// `None` when the IMU had nothing new that tick.
    pub imu: Option<ImuSample>,
    pub ir: IrReading,
    pub tof_mm: Option<u16>,
    /// Stop line level sampled at the start of the tick.
    pub stop: bool,
    /// Wheel targets commanded for this tick, rad/s.
    pub target: (f32, f32),
}

/// One duty write seen by the replay bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedCommand {
    /// Index of the frame that was current when the write happened.
    pub frame: usize,
    pub left: f32,
    pub right: f32,
    pub enabled: bool,
}

#[derive(Debug)]
struct Deck {
    frames: Vec<Frame>,
    cursor: Option<usize>,
    enabled: bool,
    commands: Vec<RecordedCommand>,
}

impl Deck {
    fn current(&self) -> HwResult<&Frame> {
        self.cursor
            .and_then(|i| self.frames.get(i))
            .ok_or_else(|| HwError::Disconnected("replay trace").into())
    }

    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |i| i + 1)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayDeck {
    deck: Arc<Mutex<Deck>>,
}

impl ReplayDeck {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            deck: Arc::new(Mutex::new(Deck {
                frames,
                cursor: None,
                enabled: false,
                commands: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Deck> {
        self.deck.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Frames not yet served.
    pub fn remaining(&self) -> usize {
        let d = self.lock();
        d.frames.len().saturating_sub(d.next_index())
    }

    /// Stop level of the frame the next tick will read. The loop samples the
    /// stop line before the encoders, so this looks one frame ahead.
    pub fn stop_line(&self) -> bool {
        let d = self.lock();
        d.frames.get(d.next_index()).is_some_and(|f| f.stop)
    }

    /// Target recorded for the next tick, if any frames remain.
    pub fn next_target(&self) -> Option<(f32, f32)> {
        let d = self.lock();
        d.frames.get(d.next_index()).map(|f| f.target)
    }

    /// Duty writes captured so far.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.lock().commands.clone()
    }

    pub fn encoders(&self) -> ReplayEncoders {
        ReplayEncoders(self.clone())
    }
    pub fn imu(&self) -> ReplayImu {
        ReplayImu(self.clone())
    }
    pub fn range(&self) -> ReplayRange {
        ReplayRange(self.clone())
    }
    pub fn ir(&self) -> ReplayIr {
        ReplayIr(self.clone())
    }
    pub fn bridge(&self) -> ReplayBridge {
        ReplayBridge(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ReplayEncoders(ReplayDeck);
#[derive(Debug, Clone)]
pub struct ReplayImu(ReplayDeck);
#[derive(Debug, Clone)]
pub struct ReplayRange(ReplayDeck);
#[derive(Debug, Clone)]
pub struct ReplayIr(ReplayDeck);
#[derive(Debug, Clone)]
pub struct ReplayBridge(ReplayDeck);

impl Encoders for ReplayEncoders {
    fn read_counts(&mut self) -> HwResult<RawCounts> {
        let mut d = self.0.lock();
        let next = d.next_index();
        if next >= d.frames.len() {
            return Err(Box::new(HwError::Disconnected("replay trace")));
        }
        d.cursor = Some(next);
        Ok(d.frames[next].counts)
    }
}

impl Imu for ReplayImu {
    fn latest(&mut self) -> HwResult<Option<ImuSample>> {
        Ok(self.0.lock().current()?.imu)
    }
}

impl RangeSensor for ReplayRange {
    fn latest_mm(&mut self) -> HwResult<Option<u16>> {
        Ok(self.0.lock().current()?.tof_mm)
    }
}

impl IrArray for ReplayIr {
    fn latest(&mut self) -> HwResult<Option<IrReading>> {
        Ok(Some(self.0.lock().current()?.ir))
    }
}

impl MotorBridge for ReplayBridge {
    fn set_duty(&mut self, left: f32, right: f32) -> HwResult<()> {
        let mut d = self.0.lock();
        let cmd = RecordedCommand {
            frame: d.cursor.unwrap_or(0),
            left,
            right,
            enabled: d.enabled,
        };
        d.commands.push(cmd);
        Ok(())
    }

    fn enable(&mut self) -> HwResult<()> {
        self.0.lock().enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> HwResult<()> {
        self.0.lock().enabled = false;
        Ok(())
    }
}
