//! Interpolating floating-point mixer with a resonant low-pass per channel.

use std::sync::Arc;

use super::voice::Voice;
use crate::mixer::{AccumBuffer, AccumDomain, ChannelStatus, Mixer, SampleBuf};

/// Two-pole resonant low-pass. A cutoff of 1.0 bypasses it.
#[derive(Clone, Copy, Debug)]
struct Filter {
    cutoff: f32,
    resonance: f32,
    b0: f32,
    b1: f32,
}

impl Default for Filter {
    fn default() -> Self {
        Self { cutoff: 1.0, resonance: 0.0, b0: 0.0, b1: 0.0 }
    }
}

impl Filter {
    fn is_open(&self) -> bool {
        self.cutoff >= 1.0 && self.resonance <= 0.0
    }

    fn process(&mut self, x: f32) -> f32 {
        if self.is_open() {
            return x;
        }
        let f = self.cutoff.clamp(0.0, 0.99);
        let fb = self.resonance + self.resonance / (1.0 - f);
        self.b0 += f * (x - self.b0 + fb * (self.b0 - self.b1));
        self.b1 += f * (self.b0 - self.b1);
        self.b1
    }
}

#[derive(Default)]
pub struct FloatMixer {
    voices: Vec<Voice>,
    filters: Vec<Filter>,
    rate: u32,
    stereo: bool,
}

impl FloatMixer {
    pub fn new() -> Self {
        Self { voices: Vec::new(), filters: Vec::new(), rate: 44100, stereo: true }
    }
}

fn interpolate(sample: &SampleBuf, voice: &Voice) -> f32 {
    let frame = voice.frame() as usize;
    let a = sample.data.get(frame).copied().unwrap_or(0) as f32;
    let next = match sample.loop_range {
        Some((start, end)) if frame + 1 >= end as usize => start as usize,
        _ => frame + 1,
    };
    let b = sample.data.get(next).copied().unwrap_or(0) as f32;
    (a + (b - a) * voice.fraction()) / 32768.0
}

impl Mixer for FloatMixer {
    fn name(&self) -> &'static str {
        "float"
    }

    fn domain(&self) -> AccumDomain {
        AccumDomain::Float
    }

    fn set_channel_count(&mut self, count: usize) {
        self.voices.resize_with(count, Voice::default);
        self.filters.resize_with(count, Filter::default);
    }

    fn channel_count(&self) -> usize {
        self.voices.len()
    }

    fn set_mix_format(&mut self, bits: u8) -> bool {
        bits == 16
    }

    fn set_stereo(&mut self, stereo: bool) -> bool {
        self.stereo = stereo;
        stereo
    }

    fn set_mix_frequency(&mut self, rate: u32) {
        self.rate = rate;
        for v in &mut self.voices {
            v.update_increment(rate);
        }
    }

    fn reset(&mut self) {
        self.voices.iter_mut().for_each(|v| *v = Voice::default());
        self.filters.iter_mut().for_each(|f| *f = Filter::default());
    }

    fn update_sample(&mut self, sample: &Arc<SampleBuf>) {
        for v in &mut self.voices {
            if v.sample.as_ref().is_some_and(|s| s.id == sample.id) {
                v.sample = Some(sample.clone());
                v.set_end(v.end);
            }
        }
    }

    fn start_note(&mut self, channel: usize, sample: Arc<SampleBuf>, offset: u32) {
        let rate = self.rate;
        if let (Some(v), Some(f)) = (self.voices.get_mut(channel), self.filters.get_mut(channel)) {
            v.start(sample, offset, rate);
            f.b0 = 0.0;
            f.b1 = 0.0;
        }
    }

    fn stop_note(&mut self, channel: usize) {
        if let Some(v) = self.voices.get_mut(channel) {
            v.stop();
        }
    }

    fn set_sample_position(&mut self, channel: usize, frame: u32) {
        if let Some(v) = self.voices.get_mut(channel) {
            v.seek(frame);
        }
    }

    fn set_sample_end(&mut self, channel: usize, end: u32) {
        if let Some(v) = self.voices.get_mut(channel) {
            v.set_end(end);
        }
    }

    fn set_frequency(&mut self, channel: usize, hz: f32) {
        let rate = self.rate;
        if let Some(v) = self.voices.get_mut(channel) {
            v.frequency = hz;
            v.update_increment(rate);
        }
    }

    fn set_volume(&mut self, channel: usize, volume: f32) {
        if let Some(v) = self.voices.get_mut(channel) {
            v.volume = volume;
        }
    }

    fn set_panning(&mut self, channel: usize, pan: f32) {
        if let Some(v) = self.voices.get_mut(channel) {
            v.pan = pan;
        }
    }

    fn set_filter_cutoff(&mut self, channel: usize, cutoff: f32) {
        if let Some(f) = self.filters.get_mut(channel) {
            f.cutoff = cutoff.clamp(0.0, 1.0);
        }
    }

    fn set_filter_resonance(&mut self, channel: usize, resonance: f32) {
        if let Some(f) = self.filters.get_mut(channel) {
            f.resonance = resonance.clamp(0.0, 1.0);
        }
    }

    fn render(&mut self, out: &mut AccumBuffer, frames: usize, mut scopes: Option<&mut [Vec<i16>]>) {
        let AccumBuffer::Float(buf) = out else {
            log::warn!("float mixer handed an integer accumulator");
            return;
        };
        let width = if self.stereo { 2 } else { 1 };
        let frames = frames.min(buf.len() / width);

        for (ch, (voice, filter)) in self.voices.iter_mut().zip(self.filters.iter_mut()).enumerate() {
            let Some(sample) = voice.sample.clone() else {
                continue;
            };
            let (left, right) = voice.gains();
            let mono = voice.volume;
            let mut scope = scopes.as_deref_mut().and_then(|s| s.get_mut(ch));

            for i in 0..frames {
                let s = filter.process(interpolate(&sample, voice));
                if self.stereo {
                    buf[2 * i] += s * left;
                    buf[2 * i + 1] += s * right;
                } else {
                    buf[i] += s * mono;
                }
                if let Some(scope) = scope.as_deref_mut() {
                    scope[i] = (s * mono * 32767.0).clamp(-32768.0, 32767.0) as i16;
                }
                if !voice.advance() {
                    break;
                }
            }
        }
    }

    fn dump_status(&self, out: &mut Vec<ChannelStatus>) {
        out.extend(self.voices.iter().enumerate().map(|(ch, v)| v.status(ch)));
    }
}
