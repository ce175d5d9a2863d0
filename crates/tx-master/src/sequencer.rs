//! Row-grid sequencer driving a [`Mixer`] at tracker tempo.
//!
//! A tick lasts `2.5 / bpm` seconds and a row lasts `speed` ticks. Notes in
//! a row fire on its first tick, and the position moves to the next row on
//! the tick after its last one, so a loop is reported exactly when the
//! wrapped row would start.

use std::ops::Range;
use std::sync::Arc;

use tx_engine::{Mixer, NoteRequest, PatternRequest, Player, Position, SampleBuf};

use crate::song::{Cell, Song, BASE_NOTE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Song,
    Pattern,
    Note,
}

/// Pattern-mode playback window.
#[derive(Clone, Debug)]
struct Window {
    first_row: u32,
    /// Exclusive.
    end_row: u32,
    single_row: bool,
    channels: Range<usize>,
}

pub struct StepSequencer {
    song: Song,
    mode: Mode,
    songpos: u32,
    patpos: u32,
    pattern: u32,
    speed: i32,
    bpm: i32,
    /// Ticks played in the current row.
    tick: u32,
    time: f64,
    looped: bool,
    window: Window,
    /// Sample held on each channel since its last trigger.
    held: Vec<Option<Arc<SampleBuf>>>,
}

/// Playback rate of `sample` for `note`.
pub fn note_frequency(sample: &SampleBuf, note: u8) -> f32 {
    sample.base_rate as f32 * ((note as f32 - BASE_NOTE as f32) / 12.0).exp2()
}

/// Amiga-style LRRL panning.
fn default_panning(channel: usize) -> f32 {
    if matches!(channel % 4, 0 | 3) {
        -0.5
    } else {
        0.5
    }
}

impl StepSequencer {
    /// Idle sequencer for `song`; playback starts with an `init_*` call.
    pub fn new(song: Song) -> Self {
        let channels = song.channels;
        Self {
            speed: song.initial_speed,
            bpm: song.initial_bpm,
            song,
            mode: Mode::Idle,
            songpos: 0,
            patpos: 0,
            pattern: 0,
            tick: 0,
            time: 0.0,
            looped: false,
            window: Window { first_row: 0, end_row: 0, single_row: false, channels: 0..channels },
            held: vec![None; channels],
        }
    }

    /// The song being sequenced.
    pub fn song(&self) -> &Song {
        &self.song
    }

    fn tick_length(&self) -> f64 {
        2.5 / self.bpm.max(1) as f64
    }

    fn restart(&mut self) {
        self.speed = self.song.initial_speed;
        self.bpm = self.song.initial_bpm;
        self.tick = 0;
        self.time = 0.0;
        self.looped = false;
        self.window.channels = 0..self.song.channels;
    }

    fn trigger(&mut self, mixer: &mut dyn Mixer, channel: usize, sample: Arc<SampleBuf>, note: u8, volume: f32) {
        mixer.start_note(channel, sample.clone(), 0);
        mixer.set_frequency(channel, note_frequency(&sample, note));
        mixer.set_volume(channel, volume);
        mixer.set_panning(channel, default_panning(channel));
        if let Some(slot) = self.held.get_mut(channel) {
            *slot = Some(sample);
        }
    }

    fn release(&mut self, mixer: &mut dyn Mixer, channel: usize) {
        let Some(held) = self.held.get_mut(channel).and_then(Option::take) else {
            return;
        };
        // One-shots ring out; looped samples have no end of their own.
        if held.loop_range.is_some() {
            mixer.stop_note(channel);
        }
    }

    fn play_row(&mut self, mixer: &mut dyn Mixer) {
        let Some(pattern) = self.song.patterns.get(self.pattern as usize) else {
            return;
        };
        let row = self.patpos as usize;
        let cells: Vec<(usize, Cell)> =
            self.window.channels.clone().map(|ch| (ch, pattern.cell(row, ch))).collect();
        for (ch, cell) in cells {
            match cell {
                Cell::Empty => {}
                Cell::Off => self.release(mixer, ch),
                Cell::Note { note, sample, volume } => match self.song.sample(sample).cloned() {
                    Some(s) => self.trigger(mixer, ch, s, note, volume),
                    None => log::debug!("sequencer: row {} channel {} names missing sample {}", row, ch, sample),
                },
            }
        }
    }

    fn advance_row(&mut self) {
        self.patpos += 1;
        match self.mode {
            Mode::Song => {
                let rows = self.song.pattern_at(self.songpos).map_or(0, |(_, p)| p.rows() as u32);
                if self.patpos >= rows {
                    self.patpos = 0;
                    self.songpos += 1;
                    if self.songpos as usize >= self.song.order.len() {
                        self.songpos = 0;
                        self.looped = true;
                    }
                    self.pattern = self.song.order.get(self.songpos as usize).copied().unwrap_or(0);
                }
            }
            Mode::Pattern => {
                if self.patpos >= self.window.end_row {
                    self.patpos = if self.window.single_row { self.window.first_row } else { 0 };
                    self.looped = true;
                }
            }
            Mode::Idle | Mode::Note => {}
        }
    }
}

impl Player for StepSequencer {
    fn channel_count(&self) -> usize {
        self.song.channels
    }

    fn reset(&mut self, mixer: &mut dyn Mixer) {
        self.stop(mixer);
        self.songpos = 0;
        self.patpos = 0;
        self.pattern = self.song.order.first().copied().unwrap_or(0);
        self.restart();
        for sample in &self.song.samples {
            mixer.update_sample(sample);
        }
    }

    fn sample(&self, id: u32) -> Option<Arc<SampleBuf>> {
        self.song.sample(id).cloned()
    }

    fn init_song(&mut self, _mixer: &mut dyn Mixer, songpos: u32, patpos: u32) -> bool {
        let Some((pattern, rows)) = self.song.pattern_at(songpos).map(|(i, p)| (i, p.rows())) else {
            return false;
        };
        if patpos as usize >= rows {
            return false;
        }
        self.restart();
        self.mode = Mode::Song;
        self.songpos = songpos;
        self.patpos = patpos;
        self.pattern = pattern;
        true
    }

    fn init_pattern(&mut self, _mixer: &mut dyn Mixer, request: &PatternRequest) -> bool {
        let Some(rows) = self.song.patterns.get(request.pattern as usize).map(|p| p.rows() as u32) else {
            return false;
        };
        if request.patpos >= rows {
            return false;
        }
        let end_row = if request.single_row {
            request.patpos + 1
        } else if request.stop_pos > request.patpos as i32 && (request.stop_pos as u32) < rows {
            request.stop_pos as u32
        } else {
            rows
        };
        let first = request.first_channel.min(self.song.channels);
        let last = if request.channels == 0 {
            self.song.channels
        } else {
            (first + request.channels).min(self.song.channels)
        };

        self.restart();
        self.mode = Mode::Pattern;
        self.pattern = request.pattern;
        self.patpos = request.patpos;
        self.window = Window {
            first_row: request.patpos,
            end_row,
            single_row: request.single_row,
            channels: first..last,
        };
        true
    }

    fn init_note_mode(&mut self, _mixer: &mut dyn Mixer) {
        self.restart();
        self.mode = Mode::Note;
    }

    fn tick(&mut self, mixer: &mut dyn Mixer) -> f64 {
        if matches!(self.mode, Mode::Song | Mode::Pattern) {
            if self.tick >= self.speed.max(1) as u32 {
                self.tick = 0;
                self.advance_row();
            }
            if self.tick == 0 {
                self.play_row(mixer);
            }
            self.tick += 1;
        }
        self.time += self.tick_length();
        self.time
    }

    fn position(&self) -> Position {
        Position {
            songpos: self.songpos,
            patpos: self.patpos,
            pattern: self.pattern,
            tempo: self.speed,
            bpm: self.bpm,
            tick: self.tick.saturating_sub(1),
        }
    }

    fn has_looped(&self) -> bool {
        self.looped
    }

    fn set_song_position(&mut self, songpos: u32) {
        let Some((pattern, _)) = self.song.pattern_at(songpos) else {
            log::debug!("sequencer: no song position {}", songpos);
            return;
        };
        self.songpos = songpos;
        self.pattern = pattern;
        self.patpos = 0;
        self.tick = 0;
    }

    fn set_pattern(&mut self, pattern: u32) {
        let Some(rows) = self.song.patterns.get(pattern as usize).map(|p| p.rows() as u32) else {
            return;
        };
        self.pattern = pattern;
        if self.patpos >= rows {
            self.patpos = 0;
        }
        if self.mode == Mode::Pattern {
            self.window.end_row = self.window.end_row.min(rows);
            self.window.first_row = self.window.first_row.min(rows.saturating_sub(1));
        }
    }

    fn set_tempo(&mut self, tempo: i32) {
        if tempo > 0 {
            self.speed = tempo;
        }
    }

    fn set_bpm(&mut self, bpm: i32) {
        if bpm > 0 {
            self.bpm = bpm;
        }
    }

    fn play_note(&mut self, mixer: &mut dyn Mixer, note: &NoteRequest) {
        let channels = self.song.channels;
        let channel = if note.all_channels {
            (0..channels)
                .map(|i| (note.channel + i) % channels.max(1))
                .find(|&ch| self.held[ch].is_none())
                .unwrap_or(note.channel)
        } else {
            note.channel
        };
        if channel >= channels {
            log::debug!("sequencer: note on channel {} of {}", channel, channels);
            return;
        }

        match &note.trigger {
            Some(trigger) => {
                self.trigger(mixer, channel, trigger.sample.clone(), note.note, 1.0);
                if trigger.offset > 0 {
                    mixer.set_sample_position(channel, trigger.offset);
                }
                if trigger.end > 0 {
                    mixer.set_sample_end(channel, trigger.end);
                }
            }
            None => match self.sample(note.instrument as u32) {
                Some(sample) => self.trigger(mixer, channel, sample, note.note, 1.0),
                None => log::debug!("sequencer: no instrument {}", note.instrument),
            },
        }
    }

    fn key_off(&mut self, mixer: &mut dyn Mixer, channel: usize) {
        self.release(mixer, channel);
    }

    fn stop_note(&mut self, mixer: &mut dyn Mixer, channel: usize) {
        mixer.stop_note(channel);
        if let Some(slot) = self.held.get_mut(channel) {
            *slot = None;
        }
    }

    fn stop(&mut self, mixer: &mut dyn Mixer) {
        for ch in 0..self.held.len() {
            self.stop_note(mixer, ch);
        }
        self.mode = Mode::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tx_engine::mixers::IntegerMixer;
    use tx_engine::{ChannelStatus, SampleTrigger};

    fn setup() -> (StepSequencer, IntegerMixer) {
        let seq = StepSequencer::new(Song::demo());
        let mut mixer = IntegerMixer::new();
        mixer.set_channel_count(seq.channel_count());
        (seq, mixer)
    }

    fn playing(mixer: &IntegerMixer) -> Vec<Option<u32>> {
        let mut out: Vec<ChannelStatus> = Vec::new();
        mixer.dump_status(&mut out);
        out.into_iter().map(|s| s.sample).collect()
    }

    #[test]
    fn ticks_follow_bpm() {
        let (mut seq, mut mixer) = setup();
        assert!(seq.init_song(&mut mixer, 0, 0));
        let t = seq.tick(&mut mixer);
        assert!((t - 0.02).abs() < 1e-12);
        seq.set_bpm(250);
        let t2 = seq.tick(&mut mixer);
        assert!((t2 - t - 0.01).abs() < 1e-12);
    }

    #[test]
    fn rows_advance_every_speed_ticks() {
        let (mut seq, mut mixer) = setup();
        seq.init_song(&mut mixer, 0, 0);
        for tick in 0..6 {
            seq.tick(&mut mixer);
            assert_eq!((seq.position().patpos, seq.position().tick), (0, tick));
        }
        seq.tick(&mut mixer);
        assert_eq!((seq.position().patpos, seq.position().tick), (1, 0));
    }

    #[test]
    fn first_row_triggers_notes() {
        let (mut seq, mut mixer) = setup();
        seq.init_song(&mut mixer, 0, 0);
        seq.tick(&mut mixer);
        let ids = playing(&mixer);
        assert_eq!(ids[0], Some(2));
        assert_eq!(ids[1], Some(1));
        assert_eq!(ids[2], None);
    }

    #[test]
    fn song_loops_after_last_position() {
        let (mut seq, mut mixer) = setup();
        seq.init_song(&mut mixer, 1, 15);
        for _ in 0..6 {
            seq.tick(&mut mixer);
        }
        assert!(!seq.has_looped());
        seq.tick(&mut mixer);
        assert!(seq.has_looped());
        assert_eq!((seq.position().songpos, seq.position().patpos), (0, 0));
    }

    #[test]
    fn invalid_start_positions_are_refused() {
        let (mut seq, mut mixer) = setup();
        assert!(!seq.init_song(&mut mixer, 2, 0));
        assert!(!seq.init_song(&mut mixer, 0, 16));
        let request = PatternRequest {
            pattern: 7,
            patpos: 0,
            single_row: false,
            stop_pos: -1,
            first_channel: 0,
            channels: 0,
        };
        assert!(!seq.init_pattern(&mut mixer, &request));
    }

    #[test]
    fn single_row_pattern_loops_on_its_row() {
        let (mut seq, mut mixer) = setup();
        let request = PatternRequest {
            pattern: 0,
            patpos: 4,
            single_row: true,
            stop_pos: -1,
            first_channel: 1,
            channels: 1,
        };
        assert!(seq.init_pattern(&mut mixer, &request));
        for _ in 0..7 {
            seq.tick(&mut mixer);
        }
        assert!(seq.has_looped());
        assert_eq!(seq.position().patpos, 4);
        // Only the bass channel is inside the window.
        assert_eq!(playing(&mixer), vec![None, Some(1), None, None]);
    }

    #[test]
    fn song_position_jump_resets_row() {
        let (mut seq, mut mixer) = setup();
        seq.init_song(&mut mixer, 0, 3);
        seq.set_song_position(1);
        assert_eq!((seq.position().songpos, seq.position().patpos, seq.position().pattern), (1, 0, 1));
        seq.set_song_position(9);
        assert_eq!(seq.position().songpos, 1);
    }

    #[test]
    fn notes_pick_a_free_channel_when_allowed() {
        let (mut seq, mut mixer) = setup();
        seq.init_note_mode(&mut mixer);
        let mut note = NoteRequest { channel: 0, note: 60, instrument: 1, all_channels: false, trigger: None };
        seq.play_note(&mut mixer, &note);
        note.all_channels = true;
        seq.play_note(&mut mixer, &note);
        assert_eq!(playing(&mixer), vec![Some(1), Some(1), None, None]);

        seq.key_off(&mut mixer, 0);
        assert_eq!(playing(&mixer)[0], None);
    }

    #[test]
    fn explicit_sample_trigger_overrides_instrument() {
        let (mut seq, mut mixer) = setup();
        seq.init_note_mode(&mut mixer);
        let sample = seq.sample(3).unwrap();
        let note = NoteRequest {
            channel: 2,
            note: 60,
            instrument: 1,
            all_channels: false,
            trigger: Some(SampleTrigger { sample, offset: 100, end: 0 }),
        };
        seq.play_note(&mut mixer, &note);
        let mut out = Vec::new();
        mixer.dump_status(&mut out);
        assert_eq!(out[2].sample, Some(3));
        assert_eq!(out[2].position, 100);
    }

    #[test]
    fn note_mode_only_advances_time() {
        let (mut seq, mut mixer) = setup();
        seq.init_note_mode(&mut mixer);
        for _ in 0..20 {
            seq.tick(&mut mixer);
        }
        assert_eq!(seq.position().patpos, 0);
        assert!(!seq.has_looped());
        assert_eq!(playing(&mixer), vec![None; 4]);
    }

    #[test]
    fn note_frequency_doubles_per_octave() {
        let s = SampleBuf::new(1, vec![0; 4], 8000);
        assert_eq!(note_frequency(&s, BASE_NOTE), 8000.0);
        assert!((note_frequency(&s, BASE_NOTE + 12) - 16000.0).abs() < 0.01);
    }
}
