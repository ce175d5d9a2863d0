//! Sequencer interface driven once per tick by the engine.

use std::sync::Arc;

use crate::mixer::{Mixer, SampleBuf};

/// Where the sequencer currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub songpos: u32,
    pub patpos: u32,
    pub pattern: u32,
    /// Ticks per row.
    pub tempo: i32,
    pub bpm: i32,
    /// Tick within the current row.
    pub tick: u32,
}

/// Pattern playback options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternRequest {
    pub pattern: u32,
    pub patpos: u32,
    pub single_row: bool,
    /// Row to stop at, or negative for the pattern end.
    pub stop_pos: i32,
    pub first_channel: usize,
    pub channels: usize,
}

/// Explicit sample to trigger, bypassing the instrument's sample map.
#[derive(Clone, Debug)]
pub struct SampleTrigger {
    pub sample: Arc<SampleBuf>,
    pub offset: u32,
    /// Frame to stop at, or 0 for the sample end.
    pub end: u32,
}

/// A note to start outside of song playback.
#[derive(Clone, Debug)]
pub struct NoteRequest {
    pub channel: usize,
    pub note: u8,
    pub instrument: u16,
    pub all_channels: bool,
    pub trigger: Option<SampleTrigger>,
}

/// A song sequencer.
///
/// Times returned by [`tick`](Player::tick) are unbent seconds since the
/// last `init_*` call and must increase with every tick.
pub trait Player: Send {
    fn channel_count(&self) -> usize;

    /// Forget all playback state and silence the mixer.
    fn reset(&mut self, mixer: &mut dyn Mixer);

    /// Look up a sample by the id carried in note commands.
    fn sample(&self, id: u32) -> Option<Arc<SampleBuf>>;

    /// Prepare song playback; false if the position does not exist.
    ///
    /// A rejected start must leave the player as it was. The engine resets
    /// the mixer after a successful init, so notes belong in `tick`.
    fn init_song(&mut self, mixer: &mut dyn Mixer, songpos: u32, patpos: u32) -> bool;
    fn init_pattern(&mut self, mixer: &mut dyn Mixer, request: &PatternRequest) -> bool;
    /// Prepare for notes only: time advances, nothing is sequenced.
    fn init_note_mode(&mut self, mixer: &mut dyn Mixer);

    /// Process one tick; returns the unbent time of the next tick.
    fn tick(&mut self, mixer: &mut dyn Mixer) -> f64;

    fn position(&self) -> Position;
    /// True once playback has wrapped to an earlier song position.
    fn has_looped(&self) -> bool;

    fn set_song_position(&mut self, songpos: u32);
    fn set_pattern(&mut self, pattern: u32);
    fn set_tempo(&mut self, tempo: i32);
    fn set_bpm(&mut self, bpm: i32);

    fn play_note(&mut self, mixer: &mut dyn Mixer, note: &NoteRequest);
    fn key_off(&mut self, mixer: &mut dyn Mixer, channel: usize);
    fn stop_note(&mut self, mixer: &mut dyn Mixer, channel: usize);
    /// Stop everything and release per-playback state.
    fn stop(&mut self, mixer: &mut dyn Mixer);
}
