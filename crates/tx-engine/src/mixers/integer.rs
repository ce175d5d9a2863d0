//! Nearest-neighbour fixed-point mixer.

use std::sync::Arc;

use super::voice::Voice;
use crate::mixer::{AccumBuffer, AccumDomain, ChannelStatus, Mixer, SampleBuf};

/// Accumulates `sample * volume` with volumes in 0..=256.
#[derive(Default)]
pub struct IntegerMixer {
    voices: Vec<Voice>,
    rate: u32,
    stereo: bool,
}

impl IntegerMixer {
    pub fn new() -> Self {
        Self { voices: Vec::new(), rate: 44100, stereo: true }
    }
}

fn fixed(gain: f32) -> i32 {
    (gain.clamp(0.0, 1.0) * 256.0) as i32
}

impl Mixer for IntegerMixer {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn domain(&self) -> AccumDomain {
        AccumDomain::Integer
    }

    fn set_channel_count(&mut self, count: usize) {
        self.voices.resize_with(count, Voice::default);
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
        for v in &mut self.voices {
            *v = Voice::default();
        }
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
        if let Some(v) = self.voices.get_mut(channel) {
            v.start(sample, offset, rate);
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

    fn render(&mut self, out: &mut AccumBuffer, frames: usize, mut scopes: Option<&mut [Vec<i16>]>) {
        let AccumBuffer::Integer(buf) = out else {
            log::warn!("integer mixer handed a float accumulator");
            return;
        };
        let width = if self.stereo { 2 } else { 1 };
        let frames = frames.min(buf.len() / width);

        for (ch, voice) in self.voices.iter_mut().enumerate() {
            let Some(sample) = voice.sample.clone() else {
                continue;
            };
            let (l, r) = voice.gains();
            let (left, right, mono) = (fixed(l), fixed(r), fixed(voice.volume));
            let mut scope = scopes.as_deref_mut().and_then(|s| s.get_mut(ch));

            for i in 0..frames {
                let s = sample.data.get(voice.frame() as usize).copied().unwrap_or(0) as i32;
                // Saturate so that any channel count clips instead of wrapping.
                if self.stereo {
                    buf[2 * i] = buf[2 * i].saturating_add(s * left);
                    buf[2 * i + 1] = buf[2 * i + 1].saturating_add(s * right);
                } else {
                    buf[i] = buf[i].saturating_add(s * mono);
                }
                if let Some(scope) = scope.as_deref_mut() {
                    scope[i] = ((s * mono) >> 8) as i16;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: i16, len: usize) -> Arc<SampleBuf> {
        Arc::new(SampleBuf::new(3, vec![value; len], 1000))
    }

    #[test]
    fn centered_voice_lands_on_both_sides() {
        let mut m = IntegerMixer::new();
        m.set_channel_count(1);
        m.set_mix_frequency(1000);
        m.start_note(0, constant(100, 16), 0);

        let mut acc = AccumBuffer::default();
        acc.prepare(AccumDomain::Integer, 8);
        m.render(&mut acc, 4, None);
        let AccumBuffer::Integer(buf) = acc else { unreachable!() };
        assert_eq!(buf, vec![100 * 256; 8]);
    }

    #[test]
    fn finished_voice_leaves_silence() {
        let mut m = IntegerMixer::new();
        m.set_channel_count(2);
        m.set_stereo(false);
        m.set_mix_frequency(1000);
        m.start_note(1, constant(10, 2), 0);

        let mut acc = AccumBuffer::default();
        acc.prepare(AccumDomain::Integer, 4);
        m.render(&mut acc, 4, None);
        let AccumBuffer::Integer(buf) = acc else { unreachable!() };
        assert_eq!(buf, vec![2560, 2560, 0, 0]);

        let mut status = Vec::new();
        m.dump_status(&mut status);
        assert_eq!(status.len(), 2);
        assert_eq!(status[1].sample, None);
    }

    #[test]
    fn scopes_get_post_volume_signal() {
        let mut m = IntegerMixer::new();
        m.set_channel_count(1);
        m.set_mix_frequency(1000);
        m.start_note(0, constant(200, 8), 0);
        m.set_volume(0, 0.5);

        let mut acc = AccumBuffer::default();
        acc.prepare(AccumDomain::Integer, 4);
        let mut scopes = vec![vec![0i16; 2]];
        m.render(&mut acc, 2, Some(&mut scopes));
        assert_eq!(scopes[0], vec![100, 100]);
    }

    #[test]
    fn many_full_scale_channels_saturate() {
        let mut m = IntegerMixer::new();
        m.set_channel_count(300);
        m.set_stereo(false);
        m.set_mix_frequency(1000);
        for ch in 0..300 {
            m.start_note(ch, constant(i16::MAX, 4), 0);
        }

        let mut acc = AccumBuffer::default();
        acc.prepare(AccumDomain::Integer, 2);
        m.render(&mut acc, 2, None);
        assert!(matches!(&acc, AccumBuffer::Integer(buf) if buf == &vec![i32::MAX; 2]));

        let mut out = Vec::new();
        assert!(crate::amplify::amplify(&acc, 300, 1.0, &mut out));
        assert_eq!(out, vec![i16::MAX; 2]);
    }

    #[test]
    fn out_of_range_channels_are_ignored() {
        let mut m = IntegerMixer::new();
        m.set_channel_count(1);
        m.start_note(5, constant(1, 1), 0);
        m.set_volume(5, 1.0);
        let mut status = Vec::new();
        m.dump_status(&mut status);
        assert_eq!(status.len(), 1);
    }
}
