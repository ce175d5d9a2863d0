//! Engine time bookkeeping and pitch-bend retiming.
//!
//! The player schedules ticks in unbent time. The engine renders in bent
//! time: every tick interval is scaled by `100 / (100 + pitchbend)` at the
//! moment the tick is processed, so a bend change never moves ticks that
//! are already scheduled.

/// Lowest pitch bend accepted; -100% would stop time.
pub const MIN_PITCHBEND: f32 = -99.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineClock {
    /// Bent time of the next frame to render.
    pub current: f64,
    pub next_tick_bent: f64,
    pub next_tick_unbent: f64,
    pub prev_tick_unbent: f64,
    /// Percent; applied to ticks processed from now on.
    pub pitchbend: f32,
    /// Takes effect at the next tick boundary.
    pub pending_pitchbend: Option<f32>,
    /// Set once playback has gone past the loop point.
    pub loop_stop_issued: bool,
    /// Engine time of the first silent frame after the loop point.
    pub loop_stop_time: Option<f64>,
}

impl EngineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind to zero, keeping the pitch bend.
    pub fn restart(&mut self) {
        let pitchbend = self.pending_pitchbend.take().unwrap_or(self.pitchbend);
        *self = Self { pitchbend, ..Self::default() };
    }

    /// Queue a bend for the next tick, clamped to [`MIN_PITCHBEND`].
    pub fn set_pitchbend(&mut self, percent: f32) {
        self.pending_pitchbend = Some(percent.max(MIN_PITCHBEND));
    }

    /// Apply a pending bend. Called right before a tick is processed.
    pub fn latch_pitchbend(&mut self) {
        if let Some(pb) = self.pending_pitchbend.take() {
            self.pitchbend = pb;
        }
    }

    /// Whole frames from `current` to the next tick at `rate`.
    pub fn frames_to_tick(&self, rate: u32) -> usize {
        ((self.next_tick_bent - self.current) * rate as f64).round().max(0.0) as usize
    }

    /// Move engine time forward by `frames` rendered at `rate`.
    pub fn advance(&mut self, frames: usize, rate: u32) {
        self.current += frames as f64 / rate as f64;
    }

    /// Account for a processed tick whose successor is due at unbent `t`.
    pub fn retime(&mut self, t: f64) {
        let scale = 100.0 / (100.0 + self.pitchbend as f64);
        self.prev_tick_unbent = self.next_tick_unbent;
        self.next_tick_bent = if scale == 1.0 && self.next_tick_bent == self.next_tick_unbent {
            // Keeps an unbent schedule bit-identical.
            t
        } else {
            self.next_tick_bent + (t - self.next_tick_unbent) * scale
        };
        self.next_tick_unbent = t;
    }
}
