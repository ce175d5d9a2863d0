//! Per-channel playback state shared by the bundled mixers.

use std::sync::Arc;

use crate::mixer::{ChannelStatus, SampleBuf};

/// Fractional bits of the sample position.
const FRAC_BITS: u32 = 32;
const FRAC_MASK: u64 = (1 << FRAC_BITS) - 1;

#[derive(Clone, Debug)]
pub(crate) struct Voice {
    pub sample: Option<Arc<SampleBuf>>,
    /// Position in sample frames (32.32 fixed-point)
    pub position: u64,
    /// Step per output frame (32.32 fixed-point)
    pub increment: u64,
    /// Exclusive end frame for non-looping playback
    pub end: u32,
    pub frequency: f32,
    /// 0.0..=1.0
    pub volume: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            sample: None,
            position: 0,
            increment: 0,
            end: 0,
            frequency: 0.0,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

impl Voice {
    /// Play `sample` from frame `offset`, keeping the current frequency if one is set.
    pub fn start(&mut self, sample: Arc<SampleBuf>, offset: u32, rate: u32) {
        self.end = sample.len();
        self.position = (offset.min(self.end) as u64) << FRAC_BITS;
        if self.frequency == 0.0 {
            self.frequency = sample.base_rate as f32;
        }
        self.sample = Some(sample);
        self.update_increment(rate);
    }

    pub fn stop(&mut self) {
        self.sample = None;
    }

    pub fn is_playing(&self) -> bool {
        self.sample.is_some()
    }

    /// Integer frame position within the sample.
    pub fn frame(&self) -> u32 {
        (self.position >> FRAC_BITS) as u32
    }

    /// Fractional part of the position in `0.0..1.0`.
    pub fn fraction(&self) -> f32 {
        (self.position & FRAC_MASK) as f32 / (1u64 << FRAC_BITS) as f32
    }

    pub fn seek(&mut self, frame: u32) {
        let limit = self.sample.as_ref().map_or(0, |s| s.len());
        self.position = (frame.min(limit) as u64) << FRAC_BITS;
    }

    /// Stop at frame `end`; 0 means the end of the sample.
    pub fn set_end(&mut self, end: u32) {
        let len = self.sample.as_ref().map_or(0, |s| s.len());
        self.end = if end == 0 { len } else { end.min(len) };
    }

    /// Recompute the per-output-frame step after a frequency or rate change.
    pub fn update_increment(&mut self, rate: u32) {
        self.increment = if rate == 0 {
            0
        } else {
            ((self.frequency.max(0.0) as f64 / rate as f64) * (1u64 << FRAC_BITS) as f64) as u64
        };
    }

    /// Left and right gains for the current volume and pan.
    pub fn gains(&self) -> (f32, f32) {
        let pan = self.pan.clamp(-1.0, 1.0);
        (self.volume * (1.0 - pan).min(1.0), self.volume * (1.0 + pan).min(1.0))
    }

    /// Step one output frame. Returns false once the voice has run out.
    pub fn advance(&mut self) -> bool {
        self.position += self.increment;
        let Some(sample) = self.sample.as_ref() else {
            return false;
        };
        let frame = self.frame();

        if let Some((start, end)) = sample.loop_range {
            if frame >= end {
                let wrapped = start + (frame - start) % (end - start);
                self.position = ((wrapped as u64) << FRAC_BITS) | (self.position & FRAC_MASK);
            }
            return true;
        }

        if frame >= self.end {
            self.sample = None;
            return false;
        }
        true
    }

    pub fn status(&self, channel: usize) -> ChannelStatus {
        ChannelStatus {
            channel,
            sample: self.sample.as_ref().map(|s| s.id),
            position: self.frame(),
            volume: if self.is_playing() { self.volume } else { 0.0 },
        }
    }
}
