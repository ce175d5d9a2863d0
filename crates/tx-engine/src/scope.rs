//! Oscilloscope history: the last few seconds of every channel's signal.
//!
//! The ring is shared behind an `RwLock`; the engine thread is the only
//! writer and holds the lock only while copying one rendered chunk.

use crate::error::ScopeAllocError;

/// One edge of the valid window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Endpoint {
    /// Frame offset into each channel buffer.
    pub offset: usize,
    /// Engine time of the frame at `offset`.
    pub time: f64,
}

/// Per-channel circular history of mono 16-bit samples.
#[derive(Debug, Default)]
pub struct ScopeRing {
    buffers: Vec<Vec<i16>>,
    capacity: usize,
    rate: u32,
    /// Frames currently inside the window, at most `capacity`.
    filled: usize,
    start: Endpoint,
    end: Endpoint,
    enabled: bool,
}

impl ScopeRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the ring for `channels` channels and `seconds` of history at `rate`.
    ///
    /// On allocation failure the ring stays disabled and keeps only time
    /// bookkeeping.
    pub fn configure(&mut self, channels: usize, seconds: f64, rate: u32) -> Result<(), ScopeAllocError> {
        let frames = (seconds.max(0.0) * rate as f64) as usize;
        self.buffers.clear();
        self.capacity = 0;
        self.rate = rate.max(1);
        self.enabled = false;
        self.reset(0.0);

        if frames == 0 || channels == 0 {
            return Ok(());
        }

        let mut buffers = Vec::new();
        let err = ScopeAllocError { channels, frames };
        buffers.try_reserve_exact(channels).map_err(|_| err)?;
        for _ in 0..channels {
            let mut buf: Vec<i16> = Vec::new();
            buf.try_reserve_exact(frames).map_err(|_| err)?;
            buf.resize(frames, 0);
            buffers.push(buf);
        }

        self.buffers = buffers;
        self.capacity = frames;
        self.enabled = true;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop recording; reads return `None` afterwards.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    /// Ring size in frames per channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Oldest frame still held.
    pub fn start(&self) -> Endpoint {
        self.start
    }

    /// Where the next rendered frame goes.
    pub fn end(&self) -> Endpoint {
        self.end
    }

    /// Duration covered by a full ring.
    pub fn window(&self) -> f64 {
        self.capacity as f64 / self.rate as f64
    }

    /// Empty the window and anchor it at `time`.
    pub fn reset(&mut self, time: f64) {
        self.filled = 0;
        self.start = Endpoint { offset: 0, time };
        self.end = Endpoint { offset: 0, time };
    }

    /// Append `frames` frames. `samples[ch]` holds at least `frames` values;
    /// `None` writes silence.
    pub fn push(&mut self, samples: Option<&[Vec<i16>]>, frames: usize) {
        if frames == 0 {
            return;
        }
        let rate = self.rate as f64;

        if !self.enabled || self.capacity == 0 {
            self.end.time += frames as f64 / rate;
            self.start = self.end;
            return;
        }

        // Only the newest `capacity` frames can survive.
        let skip = frames.saturating_sub(self.capacity);
        let keep = frames - skip;
        for (ch, buf) in self.buffers.iter_mut().enumerate() {
            let src = samples.and_then(|s| s.get(ch)).map(|s| &s[skip..frames]);
            let mut at = (self.end.offset + skip) % self.capacity;
            let mut done = 0;
            while done < keep {
                let n = (keep - done).min(self.capacity - at);
                match src {
                    Some(src) => buf[at..at + n].copy_from_slice(&src[done..done + n]),
                    None => buf[at..at + n].fill(0),
                }
                done += n;
                at = (at + n) % self.capacity;
            }
        }

        self.end.offset = (self.end.offset + frames) % self.capacity;
        self.end.time += frames as f64 / rate;
        self.filled += frames;

        if self.filled > self.capacity {
            let excess = self.filled - self.capacity;
            self.start.offset = (self.start.offset + excess) % self.capacity;
            self.start.time += excess as f64 / rate;
            self.filled = self.capacity;
        }
    }

    /// Up to `len` samples of `channel` ending at engine time `time`.
    ///
    /// `time` is clamped into the valid window. Returns `None` for a disabled
    /// ring or an unknown channel.
    pub fn read(&self, channel: usize, time: f64, len: usize) -> Option<Vec<i16>> {
        if !self.enabled {
            return None;
        }
        let buf = self.buffers.get(channel)?;
        let time = time.clamp(self.start.time, self.end.time);
        let back = (((self.end.time - time) * self.rate as f64).round() as usize).min(self.filled);
        let n = len.min(self.filled - back);

        let last = (self.end.offset + self.capacity - back) % self.capacity;
        let first = (last + self.capacity - n) % self.capacity;
        let mut out = Vec::with_capacity(n);
        if first + n <= self.capacity {
            out.extend_from_slice(&buf[first..first + n]);
        } else {
            out.extend_from_slice(&buf[first..]);
            out.extend_from_slice(&buf[..n - (self.capacity - first)]);
        }
        Some(out)
    }
}
