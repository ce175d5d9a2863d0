//! A minimal song model: an order list of fixed-grid patterns.

use std::sync::Arc;

use tx_engine::SampleBuf;

/// Note number that plays a sample at its base rate.
pub const BASE_NOTE: u8 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Note {
        note: u8,
        sample: u32,
        volume: f32,
    },
    /// Release the note on this channel.
    Off,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    rows: usize,
    channels: usize,
    cells: Vec<Cell>,
}

impl Pattern {
    /// An empty pattern.
    pub fn new(rows: usize, channels: usize) -> Self {
        Self { rows, channels, cells: vec![Cell::Empty; rows * channels] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The cell at `row`/`channel`; empty outside the grid.
    pub fn cell(&self, row: usize, channel: usize) -> Cell {
        if channel >= self.channels {
            return Cell::Empty;
        }
        self.cells.get(row * self.channels + channel).copied().unwrap_or_default()
    }

    /// Overwrite one cell. Writes outside the grid are ignored.
    pub fn set(&mut self, row: usize, channel: usize, cell: Cell) {
        if row < self.rows && channel < self.channels {
            self.cells[row * self.channels + channel] = cell;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    pub title: String,
    pub channels: usize,
    /// Ticks per row.
    pub initial_speed: i32,
    pub initial_bpm: i32,
    /// Pattern index per song position.
    pub order: Vec<u32>,
    pub patterns: Vec<Pattern>,
    pub samples: Vec<Arc<SampleBuf>>,
}

impl Song {
    /// An empty song at speed 6, 125 BPM.
    pub fn with_channels(title: &str, channels: usize) -> Self {
        Self {
            title: title.into(),
            channels,
            initial_speed: 6,
            initial_bpm: 125,
            order: Vec::new(),
            patterns: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Look up a sample by id.
    pub fn sample(&self, id: u32) -> Option<&Arc<SampleBuf>> {
        self.samples.iter().find(|s| s.id == id)
    }

    /// Pattern played at song position `songpos`.
    pub fn pattern_at(&self, songpos: u32) -> Option<(u32, &Pattern)> {
        let index = *self.order.get(songpos as usize)?;
        self.patterns.get(index as usize).map(|p| (index, p))
    }

    /// Two 16-row patterns of bass, kick and hat on four channels.
    pub fn demo() -> Self {
        let mut song = Self::with_channels("demo", 4);
        song.samples = vec![Arc::new(tone()), Arc::new(kick()), Arc::new(hat())];

        let note = |note, sample, volume| Cell::Note { note, sample, volume };
        let bass = [48u8, 48, 55, 53];
        for (p, root) in [0u8, 5].into_iter().enumerate() {
            let mut pattern = Pattern::new(16, 4);
            for row in 0..16 {
                if row % 4 == 0 {
                    pattern.set(row, 0, note(BASE_NOTE, KICK, 1.0));
                    pattern.set(row, 1, note(bass[row / 4] + root, TONE, 0.6));
                }
                if row % 2 == 1 {
                    pattern.set(row, 2, note(BASE_NOTE, HAT, if row % 4 == 3 { 0.5 } else { 0.3 }));
                }
                if row == 14 {
                    pattern.set(row, 1, Cell::Off);
                }
            }
            pattern.set(0, 3, note(72 + root + p as u8 * 2, TONE, 0.3));
            pattern.set(8, 3, note(79 + root, TONE, 0.3));
            song.patterns.push(pattern);
        }
        song.order = vec![0, 1];
        song
    }
}

const TONE: u32 = 1;
const KICK: u32 = 2;
const HAT: u32 = 3;
const DEMO_RATE: u32 = 8363;

/// One looped cycle of a soft square, 32 frames long.
fn tone() -> SampleBuf {
    let data = (0..32)
        .map(|i| {
            let phase = i as f32 / 32.0 * std::f32::consts::TAU;
            ((phase.sin() + phase.sin().signum() * 0.3) * 16000.0) as i16
        })
        .collect();
    SampleBuf::new(TONE, data, DEMO_RATE).looped(0, 32)
}

/// A falling sine with an exponential decay.
fn kick() -> SampleBuf {
    let mut phase = 0.0f32;
    let data = (0..3000)
        .map(|i| {
            let t = i as f32 / DEMO_RATE as f32;
            phase += (40.0 + 120.0 * (-t * 30.0).exp()) / DEMO_RATE as f32;
            ((phase * std::f32::consts::TAU).sin() * (-t * 12.0).exp() * 30000.0) as i16
        })
        .collect();
    SampleBuf::new(KICK, data, DEMO_RATE)
}

/// Short decaying noise from a linear congruential generator.
fn hat() -> SampleBuf {
    let mut seed = 0x1234_5678u32;
    let data = (0..800)
        .map(|i| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (seed >> 16) as i16 as f32;
            (noise * (-(i as f32) / 120.0).exp() * 0.5) as i16
        })
        .collect();
    SampleBuf::new(HAT, data, DEMO_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_cells_are_empty() {
        let mut p = Pattern::new(2, 2);
        p.set(1, 1, Cell::Off);
        p.set(5, 0, Cell::Off);
        assert_eq!(p.cell(1, 1), Cell::Off);
        assert_eq!(p.cell(5, 0), Cell::Empty);
        assert_eq!(p.cell(0, 9), Cell::Empty);
    }

    #[test]
    fn demo_song_is_consistent() {
        let song = Song::demo();
        assert_eq!(song.order.len(), 2);
        for pos in 0..song.order.len() as u32 {
            let (_, pattern) = song.pattern_at(pos).unwrap();
            assert_eq!(pattern.channels(), song.channels);
        }
        for id in [TONE, KICK, HAT] {
            assert!(song.sample(id).is_some_and(|s| !s.is_empty()));
        }
        assert!(song.pattern_at(2).is_none());
    }
}
