//! Sample-synthesis interface and its accumulation buffers.

use std::sync::Arc;

/// A mono 16-bit sample the mixers can play.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuf {
    pub id: u32,
    pub data: Vec<i16>,
    /// Loop start and end in frames, if the sample loops.
    pub loop_range: Option<(u32, u32)>,
    /// Playback rate of the sample at its base note.
    pub base_rate: u32,
}

impl SampleBuf {
    pub fn new(id: u32, data: Vec<i16>, base_rate: u32) -> Self {
        Self { id, data, loop_range: None, base_rate }
    }

    /// Loop frames `start..end` once playback reaches `end`.
    pub fn looped(mut self, start: u32, end: u32) -> Self {
        let end = end.min(self.data.len() as u32);
        if start < end {
            self.loop_range = Some((start, end));
        }
        self
    }

    /// Length in frames.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Numeric domain a mixer accumulates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumDomain {
    /// 32-bit integers: sample value times a 0..=256 volume.
    Integer,
    /// Floats where full scale is 1.0.
    Float,
}

/// Interleaved accumulation buffer, one slot per native sample.
#[derive(Clone, Debug)]
pub enum AccumBuffer {
    Integer(Vec<i32>),
    Float(Vec<f32>),
}

impl Default for AccumBuffer {
    fn default() -> Self {
        AccumBuffer::Integer(Vec::new())
    }
}

impl AccumBuffer {
    /// Zero the buffer to `len` slots in `domain`, reusing its allocation when possible.
    pub fn prepare(&mut self, domain: AccumDomain, len: usize) {
        match (domain, &mut *self) {
            (AccumDomain::Integer, AccumBuffer::Integer(buf)) => {
                buf.clear();
                buf.resize(len, 0);
            }
            (AccumDomain::Float, AccumBuffer::Float(buf)) => {
                buf.clear();
                buf.resize(len, 0.0);
            }
            (AccumDomain::Integer, _) => *self = AccumBuffer::Integer(vec![0; len]),
            (AccumDomain::Float, _) => *self = AccumBuffer::Float(vec![0.0; len]),
        }
    }

    pub fn domain(&self) -> AccumDomain {
        match self {
            AccumBuffer::Integer(_) => AccumDomain::Integer,
            AccumBuffer::Float(_) => AccumDomain::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AccumBuffer::Integer(buf) => buf.len(),
            AccumBuffer::Float(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-channel state published for the UI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelStatus {
    pub channel: usize,
    /// Id of the sample playing, if any.
    pub sample: Option<u32>,
    /// Current frame within the sample.
    pub position: u32,
    pub volume: f32,
}

/// A sample-synthesis engine.
///
/// The engine calls these only from its own thread. Channel indices outside
/// the configured count are ignored.
pub trait Mixer: Send {
    fn name(&self) -> &'static str;

    fn domain(&self) -> AccumDomain;

    // --- Configuration ---

    fn set_channel_count(&mut self, count: usize);
    fn channel_count(&self) -> usize;
    /// Request a native sample depth; false if unsupported.
    fn set_mix_format(&mut self, bits: u8) -> bool;
    /// Request stereo output; returns whether the mixer now renders stereo.
    fn set_stereo(&mut self, stereo: bool) -> bool;
    fn set_mix_frequency(&mut self, rate: u32);
    /// Silence every channel.
    fn reset(&mut self);
    /// A sample's data changed; channels playing it pick up the new buffer.
    fn update_sample(&mut self, sample: &Arc<SampleBuf>);

    // --- Per-channel control ---

    fn start_note(&mut self, channel: usize, sample: Arc<SampleBuf>, offset: u32);
    fn stop_note(&mut self, channel: usize);
    fn set_sample_position(&mut self, channel: usize, frame: u32);
    fn set_sample_end(&mut self, channel: usize, end: u32);
    fn set_frequency(&mut self, channel: usize, hz: f32);
    /// Volume in `0.0..=1.0`.
    fn set_volume(&mut self, channel: usize, volume: f32);
    /// Panning in `-1.0..=1.0`.
    fn set_panning(&mut self, channel: usize, pan: f32);
    fn set_filter_cutoff(&mut self, _channel: usize, _cutoff: f32) {}
    fn set_filter_resonance(&mut self, _channel: usize, _resonance: f32) {}

    // --- Rendering ---

    /// Mix `frames` frames into `out`, which is already zeroed and sized.
    ///
    /// When `scopes` is given, each channel's post-volume mono signal is
    /// written to `scopes[channel][0..frames]`.
    fn render(&mut self, out: &mut AccumBuffer, frames: usize, scopes: Option<&mut [Vec<i16>]>);

    /// Append one entry per channel to `out`.
    fn dump_status(&self, out: &mut Vec<ChannelStatus>);
}
