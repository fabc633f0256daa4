//! Background sensor sampling.
//!
//! Spawns a thread that owns a blocking sensor read, publishes the latest value
//! through a bounded channel, and tracks the last-ok timestamp for watchdog
//! logic. The control tick only ever calls [`Sampler::latest`], which never
//! blocks.
//!
//! Each `Sampler` spawns exactly one thread, shut down and joined on drop.
use crossbeam_channel as xch;
use rover_traits::{Clock, HwResult, Imu, ImuSample, RangeSensor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct Sampler<T> {
    rx: xch::Receiver<T>,
    last_ok: Arc<AtomicU64>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl<T: Send + 'static> Sampler<T> {
    /// Poll `read` at `hz` on a dedicated thread.
    ///
    /// `read` returns `Ok(None)` when the device has nothing new. Errors are
    /// logged and skipped; the consumer notices through [`stalled_ms`](Self::stalled_ms).
    pub fn spawn<F>(mut read: F, hz: u32, clock: Arc<dyn Clock + Send + Sync>) -> Self
    where
        F: FnMut() -> HwResult<Option<T>> + Send + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let drain = rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = Arc::clone(&shutdown);
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_thread = Arc::clone(&last_ok);
        let period = Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();
        let thread_clock = Arc::clone(&clock);

        let join_handle = std::thread::spawn(move || {
            let mut errors: u64 = 0;
            while !shutdown_thread.load(Ordering::Relaxed) {
                match read() {
                    Ok(Some(v)) => {
                        // keep only the newest value
                        let _ = drain.try_recv();
                        if let Err(xch::TrySendError::Disconnected(_)) = tx.try_send(v) {
                            tracing::debug!("sampler consumer disconnected, exiting thread");
                            break;
                        }
                        last_ok_thread.store(thread_clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        errors = errors.saturating_add(1);
                        tracing::trace!(error = %e, errors, "sampler read failed");
                    }
                }
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                thread_clock.sleep(period);
            }
            tracing::trace!("sampler thread exiting");
        });

        Self {
            rx,
            last_ok,
            clock,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Newest value published since the previous call, if any.
    pub fn latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    /// Milliseconds between `now_ms` (relative to the sampler epoch) and the last good read.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Stall measured against the sampler's own clock.
    pub fn stalled_ms(&self) -> u64 {
        self.stalled_for(self.clock.ms_since(self.epoch))
    }
}

impl<T> Drop for Sampler<T> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after its current read returns.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("sampler thread joined"),
                Err(e) => tracing::warn!(?e, "sampler thread panicked during shutdown"),
            }
        }
    }
}

impl RangeSensor for Sampler<u16> {
    fn latest_mm(&mut self) -> HwResult<Option<u16>> {
        Ok(self.latest())
    }
}

impl Imu for Sampler<ImuSample> {
    fn latest(&mut self) -> HwResult<Option<ImuSample>> {
        Ok(Sampler::latest(self))
    }
}
