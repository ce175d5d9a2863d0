//! Output device interface.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tx_proto::{ChannelError, Command, CommandSender, MixFormat};

use crate::error::DeviceError;

#[derive(Default)]
struct ClockInner {
    time_bits: AtomicU64,
    rate: AtomicU32,
}

/// Playback time as heard at the device, in engine seconds.
///
/// Written by the device (usually from its callback), read by anyone.
#[derive(Clone, Default)]
pub struct PlayClock {
    inner: Arc<ClockInner>,
}

impl PlayClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds of audio the device has played.
    pub fn time(&self) -> f64 {
        f64::from_bits(self.inner.time_bits.load(Ordering::Acquire))
    }

    pub fn set_time(&self, time: f64) {
        self.inner.time_bits.store(time.to_bits(), Ordering::Release);
    }

    /// Move the clock forward by `frames` at the current rate.
    pub fn advance(&self, frames: usize) {
        let rate = self.rate();
        if rate > 0 {
            self.set_time(self.time() + frames as f64 / rate as f64);
        }
    }

    /// Sample rate of the open device, or 0.
    pub fn rate(&self) -> u32 {
        self.inner.rate.load(Ordering::Relaxed)
    }

    pub fn set_rate(&self, rate: u32) {
        self.inner.rate.store(rate, Ordering::Relaxed);
    }
}

/// What a device gets when it is opened.
pub struct DeviceContext {
    /// Stamped into every data request; requests from an older open are ignored.
    pub epoch: u32,
    requests: CommandSender,
}

impl DeviceContext {
    /// Context for the open stamped with `epoch`.
    pub fn new(epoch: u32, requests: CommandSender) -> Self {
        Self { epoch, requests }
    }

    /// Ask the engine for `count` frames in `format`.
    pub fn request(&self, count: u32, rate: u32, format: MixFormat) -> Result<(), ChannelError> {
        self.requests.send(&Command::DataRequested {
            epoch: self.epoch,
            count,
            rate,
            format,
        })
    }
}

/// An audio sink that pulls data from the engine by posting
/// [`Command::DataRequested`] on the command channel.
pub trait OutputDevice: Send {
    fn name(&self) -> &str;

    /// Start requesting data. The play clock restarts at zero.
    fn open(&mut self, ctx: DeviceContext) -> Result<(), DeviceError>;

    /// Stop requesting data and free the hardware.
    fn release(&mut self);

    /// Rendered bytes for the last request.
    fn commit(&mut self, data: &[u8]);

    fn clock(&self) -> PlayClock;

    fn play_time(&self) -> f64 {
        self.clock().time()
    }

    fn play_rate(&self) -> u32 {
        self.clock().rate()
    }
}
