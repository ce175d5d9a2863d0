//! State the engine publishes to control threads.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mixer::ChannelStatus;
use crate::player::Position;
use crate::scope::ScopeRing;
use crate::sync::Synchronizer;
use crate::time_queue::TimeQueue;

/// Player position at one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionSnapshot {
    pub position: Position,
    pub prev_tempo: i32,
    /// Engine time of this tick.
    pub time: f64,
    /// Engine time the next tick is due.
    pub next_tick_time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PositionEvent {
    Tick(PositionSnapshot),
    /// Playback ran past the loop point and stopped.
    Stopped,
}

/// Queues and synchronizers shared between the engine and its controllers.
#[derive(Default)]
pub struct Telemetry {
    pub positions: TimeQueue<PositionEvent>,
    pub channels: TimeQueue<Vec<ChannelStatus>>,
    pub clipping: TimeQueue<bool>,
    /// Confirms once the player reaches the armed song position.
    pub songpos: Synchronizer<u32>,
    pub tempo: Synchronizer<i32>,
    pub bpm: Synchronizer<i32>,
    /// Confirms when the engine completes a stop, and at no other time.
    /// Starting playback does not reset it.
    pub stopped: Synchronizer<()>,
    scope: RwLock<ScopeRing>,
}

impl Telemetry {
    /// Empty queues, unarmed synchronizers and a disabled scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything queued from a previous playback.
    pub fn clear_queues(&self) {
        self.positions.clear();
        self.channels.clear();
        self.clipping.clear();
    }

    /// Drop armed song position, tempo and BPM requests.
    pub fn reset_syncs(&self) {
        self.songpos.reset();
        self.tempo.reset();
        self.bpm.reset();
    }

    /// Read access to the oscilloscope ring.
    pub fn scope(&self) -> RwLockReadGuard<'_, ScopeRing> {
        self.scope.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn scope_mut(&self) -> RwLockWriteGuard<'_, ScopeRing> {
        self.scope.write().unwrap_or_else(PoisonError::into_inner)
    }
}
