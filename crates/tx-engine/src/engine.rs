//! The mixing orchestrator.
//!
//! [`AudioEngine`] owns the engine clock, the mixers, the sequencer and the
//! output device. It is driven by commands: a device asks for audio with
//! [`Command::DataRequested`], and the engine answers by interleaving
//! rendered chunks with sequencer ticks until the request is filled.

use std::sync::Arc;

use tx_proto::{Command, CommandSender, MixFormat, Status, StatusSender};

use crate::amplify::amplify;
use crate::clock::EngineClock;
use crate::convert::ConversionPlan;
use crate::device::{DeviceContext, OutputDevice};
use crate::error::{DeviceError, FormatError};
use crate::mixer::{AccumBuffer, ChannelStatus, Mixer};
use crate::player::{NoteRequest, PatternRequest, Player, SampleTrigger};
use crate::telemetry::{PositionEvent, PositionSnapshot, Telemetry};

/// Periodic snapshots a clip stays visible for.
pub const CLIP_SMEAR_UPDATES: u32 = 4;

/// Knobs the engine takes at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Float-domain gain.
    pub amplification: f32,
    pub scopes: bool,
    pub scope_seconds: f64,
    /// Channel status and clip snapshots per second.
    pub ui_update_hz: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            amplification: 1.0,
            scopes: true,
            scope_seconds: 1.0,
            ui_update_hz: 50,
        }
    }
}

/// Whether a render publishes telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixMode {
    /// Interactive playback: positions, snapshots, scopes and synchronizers.
    Full,
    /// Offline render: audio only.
    DryRun,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayMode {
    Song,
    Pattern,
    Note,
}

impl PlayMode {
    fn started(self) -> Status {
        match self {
            PlayMode::Song => Status::PlayingStarted,
            PlayMode::Pattern => Status::PlayingPatternStarted,
            PlayMode::Note => Status::PlayingNoteStarted,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Playing(PlayMode),
    /// Tearing down; never observed between commands.
    Stopping,
}

/// What the dispatch loop should do after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct DeviceSlot {
    device: Box<dyn OutputDevice>,
    requests: CommandSender,
}

/// Output configuration derived from the last data request.
struct OutputConfig {
    format: MixFormat,
    rate: u32,
    plan: ConversionPlan,
    snapshot_interval: usize,
}

pub struct AudioEngine {
    settings: EngineSettings,
    mixers: Vec<Box<dyn Mixer>>,
    active_mixer: usize,
    player: Box<dyn Player>,
    device: Option<DeviceSlot>,
    status: Option<StatusSender>,
    telemetry: Arc<Telemetry>,

    state: EngineState,
    clock: EngineClock,
    /// Bumped on every device open.
    epoch: u32,
    stop_at_loop: bool,
    output: Option<OutputConfig>,
    amplification: f32,
    clip_smear: u32,
    until_snapshot: usize,

    // Render scratch, reused across requests.
    accum: AccumBuffer,
    pcm: Vec<i16>,
    words: Vec<u16>,
    rendered: Vec<u8>,
    scope_taps: Vec<Vec<i16>>,
    statuses: Vec<ChannelStatus>,
}

impl AudioEngine {
    /// Create an engine with no device and no status channel.
    ///
    /// `mixers` must not be empty; the first one starts out active.
    pub fn new(player: Box<dyn Player>, mixers: Vec<Box<dyn Mixer>>, settings: EngineSettings) -> Self {
        let mixers = if mixers.is_empty() { crate::mixers::standard_mixers() } else { mixers };
        let amplification = settings.amplification;
        Self {
            settings,
            mixers,
            active_mixer: 0,
            player,
            device: None,
            status: None,
            telemetry: Arc::new(Telemetry::new()),
            state: EngineState::Idle,
            clock: EngineClock::new(),
            epoch: 0,
            stop_at_loop: false,
            output: None,
            amplification,
            clip_smear: 0,
            until_snapshot: 0,
            accum: AccumBuffer::default(),
            pcm: Vec::new(),
            words: Vec::new(),
            rendered: Vec::new(),
            scope_taps: Vec::new(),
            statuses: Vec::new(),
        }
    }

    /// Attach an output device. `requests` is the engine's own command
    /// channel; the device posts data requests on it.
    pub fn with_device(mut self, device: Box<dyn OutputDevice>, requests: CommandSender) -> Self {
        self.device = Some(DeviceSlot { device, requests });
        self
    }

    /// Report status messages on `status`.
    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = Some(status);
        self
    }

    /// Queues and synchronizers shared with control threads.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Current playback state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Epoch of the last device open; data requests must carry it.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Engine time and the tick schedule.
    pub fn clock(&self) -> &EngineClock {
        &self.clock
    }

    /// The mixer rendering audio.
    pub fn active_mixer(&self) -> &dyn Mixer {
        self.mixers[self.active_mixer].as_ref()
    }

    /// True once playback in stop-at-loop mode has passed the loop point.
    pub fn loop_reached(&self) -> bool {
        self.clock.loop_stop_issued
    }

    fn report(&mut self, status: Status) {
        match &status {
            Status::Error(text) | Status::Errno { text, .. } => log::error!("engine: {}", text),
            Status::Warning(text) => log::warn!("engine: {}", text),
            Status::DriverOpenFailed => log::error!("engine: could not open the output device"),
            _ => log::debug!("engine: {:?}", status),
        }
        if let Some(tx) = self.status.as_mut() {
            // The sender logs its own failures.
            let _ = tx.send(&status);
        }
    }

    // --- Command dispatch ---

    /// Process one command.
    pub fn dispatch(&mut self, command: Command) -> Flow {
        match command {
            Command::InitPlayer => self.init_player(),
            Command::PlaySong { songpos, patpos, looped } => {
                self.play(PlayMode::Song, looped, |p, m| p.init_song(m, songpos, patpos));
            }
            Command::PlayPattern {
                pattern,
                patpos,
                single_row,
                looped,
                stop_pos,
                first_channel,
                channels,
            } => {
                let request = PatternRequest {
                    pattern,
                    patpos,
                    single_row,
                    stop_pos,
                    first_channel: first_channel as usize,
                    channels: channels as usize,
                };
                self.play(PlayMode::Pattern, looped, |p, m| p.init_pattern(m, &request));
            }
            Command::PlayNote { channel, note, instrument, all_channels } => {
                self.play_note(NoteRequest {
                    channel: channel as usize,
                    note,
                    instrument,
                    all_channels,
                    trigger: None,
                });
            }
            Command::PlayNoteFull {
                channel,
                note,
                sample,
                offset,
                end,
                all_channels,
                instrument,
                sample_index: _,
            } => match self.player.sample(sample) {
                Some(sample) => self.play_note(NoteRequest {
                    channel: channel as usize,
                    note,
                    instrument,
                    all_channels,
                    trigger: Some(SampleTrigger { sample, offset, end }),
                }),
                None => self.report(Status::Warning(format!("no sample with id {}", sample))),
            },
            Command::PlayNoteKeyoff { channel } => {
                let mixer = self.mixers[self.active_mixer].as_mut();
                self.player.key_off(mixer, channel as usize);
            }
            Command::StopNote { channel } => {
                let mixer = self.mixers[self.active_mixer].as_mut();
                self.player.stop_note(mixer, channel as usize);
            }
            Command::StopPlaying => self.stop(),
            Command::SetSongPosition { songpos } => {
                self.player.set_song_position(songpos);
                if self.state == EngineState::Idle {
                    self.telemetry.songpos.confirm(0.0);
                }
            }
            Command::SetPattern { pattern } => self.player.set_pattern(pattern),
            Command::SetAmplification { gain } => self.amplification = gain,
            Command::SetPitchbend { percent } => self.clock.set_pitchbend(percent),
            Command::SetMixer { index } => self.set_mixer(index as usize),
            Command::SetTempo { tempo } => {
                self.player.set_tempo(tempo);
                if self.state == EngineState::Idle {
                    self.telemetry.tempo.confirm(0.0);
                }
            }
            Command::SetBpm { bpm } => {
                self.player.set_bpm(bpm);
                if self.state == EngineState::Idle {
                    self.telemetry.bpm.confirm(0.0);
                }
            }
            Command::DataRequested { epoch, count, rate, format } => {
                self.data_requested(epoch, count as usize, rate, format)
            }
            Command::Quit => {
                if self.state != EngineState::Idle {
                    self.stop();
                }
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn init_player(&mut self) {
        if self.state != EngineState::Idle {
            self.report(Status::Warning("cannot reinitialise the player during playback".into()));
            return;
        }
        let mixer = self.mixers[self.active_mixer].as_mut();
        self.player.reset(mixer);
        mixer.set_channel_count(self.player.channel_count());
    }

    fn set_mixer(&mut self, index: usize) {
        if index >= self.mixers.len() {
            self.report(Status::Warning(format!("no mixer with index {}", index)));
            return;
        }
        if index == self.active_mixer {
            return;
        }

        self.mixers[self.active_mixer].reset();
        self.active_mixer = index;
        let mixer = self.mixers[index].as_mut();
        mixer.reset();
        mixer.set_channel_count(self.player.channel_count());
        log::info!("engine: switched to the {} mixer", mixer.name());
        // The new mixer needs its native format negotiated again.
        self.output = None;
    }

    // --- Playback lifecycle ---

    fn play(
        &mut self,
        mode: PlayMode,
        looped: bool,
        init: impl FnOnce(&mut dyn Player, &mut dyn Mixer) -> bool,
    ) {
        if self.state != EngineState::Idle {
            self.halt();
        }
        if let Err(e) = self.open_device() {
            self.report(Status::DriverOpenFailed);
            self.report(e.to_status());
            return;
        }
        if !self.begin(mode, looped, init) {
            self.close_device();
            self.report(Status::Error(format!("could not start {:?} playback", mode)));
            return;
        }
        self.report(mode.started());
    }

    fn play_note(&mut self, note: NoteRequest) {
        if self.state == EngineState::Idle {
            if let Err(e) = self.open_device() {
                self.report(Status::DriverOpenFailed);
                self.report(e.to_status());
                return;
            }
            self.begin(PlayMode::Note, true, |p, m| {
                p.init_note_mode(m);
                true
            });
            self.report(Status::PlayingNoteStarted);
        }
        let mixer = self.mixers[self.active_mixer].as_mut();
        self.player.play_note(mixer, &note);
    }

    /// Initialise the sequencer, then reset clock and telemetry.
    ///
    /// This is the device-independent half of starting playback; offline
    /// renders call it directly and then pull audio with [`mix`](Self::mix).
    /// If `init` rejects the start position nothing else is touched.
    pub fn begin(
        &mut self,
        mode: PlayMode,
        looped: bool,
        init: impl FnOnce(&mut dyn Player, &mut dyn Mixer) -> bool,
    ) -> bool {
        let mixer = self.mixers[self.active_mixer].as_mut();
        if !init(self.player.as_mut(), mixer) {
            return false;
        }
        mixer.reset();
        mixer.set_channel_count(self.player.channel_count());

        self.clock.restart();
        self.stop_at_loop = !looped;
        self.clip_smear = 0;
        self.output = None;
        self.telemetry.clear_queues();
        self.telemetry.reset_syncs();
        self.state = EngineState::Playing(mode);
        true
    }

    fn open_device(&mut self) -> Result<(), DeviceError> {
        let Some(slot) = self.device.as_mut() else {
            return Ok(());
        };
        self.epoch = self.epoch.wrapping_add(1);
        let ctx = DeviceContext::new(self.epoch, slot.requests.clone());
        slot.device.open(ctx)?;
        log::info!("engine: opened {} (epoch {})", slot.device.name(), self.epoch);
        Ok(())
    }

    fn close_device(&mut self) {
        if let Some(slot) = self.device.as_mut() {
            slot.device.release();
            log::info!("engine: released {}", slot.device.name());
        }
    }

    /// Stop without reporting; used when a new play request replaces the current one.
    fn halt(&mut self) {
        self.state = EngineState::Stopping;
        self.close_device();
        let mixer = self.mixers[self.active_mixer].as_mut();
        self.player.stop(mixer);
        mixer.reset();
        self.clock.loop_stop_time = None;
        self.state = EngineState::Idle;
    }

    /// The full stop sequence.
    pub fn stop(&mut self) {
        if self.state != EngineState::Idle {
            self.halt();
        }
        self.telemetry.songpos.confirm(0.0);
        self.report(Status::PlayingStopped);
        self.telemetry.stopped.confirm(self.clock.current);
    }

    fn data_requested(&mut self, epoch: u32, count: usize, rate: u32, format: MixFormat) {
        if !matches!(self.state, EngineState::Playing(_)) || epoch != self.epoch {
            log::debug!(
                "engine: discarding data request (epoch {}, active {}, state {:?})",
                epoch,
                self.epoch,
                self.state
            );
            return;
        }

        if let Err(e) = self.render(count, rate, format, MixMode::Full) {
            self.report(Status::Error(e.to_string()));
            self.stop();
            return;
        }
        if let Some(slot) = self.device.as_mut() {
            slot.device.commit(&self.rendered);
        }

        if let Some(marker) = self.clock.loop_stop_time {
            let heard = self.device.as_ref().map_or(f64::INFINITY, |s| s.device.play_time());
            if heard >= marker {
                log::info!("engine: playback passed the loop point, stopping");
                self.stop();
            }
        }
    }

    // --- Rendering ---

    /// Render `count` frames in `format` at `rate`.
    ///
    /// Outside of playback this returns silence.
    pub fn mix(&mut self, count: usize, rate: u32, format: MixFormat, mode: MixMode) -> Result<&[u8], FormatError> {
        self.render(count, rate, format, mode)?;
        Ok(&self.rendered)
    }

    fn configure_output(&mut self, format: MixFormat, rate: u32) -> Result<(), FormatError> {
        let mixer = self.mixers[self.active_mixer].as_mut();
        if !mixer.set_mix_format(16) {
            return Err(FormatError::NoUsableDepth(mixer.name()));
        }
        let stereo = mixer.set_stereo(true);
        mixer.set_mix_frequency(rate);

        let native = MixFormat {
            bits: 16,
            signed: true,
            big_endian: cfg!(target_endian = "big"),
            channels: if stereo { 2 } else { 1 },
        };
        let plan = ConversionPlan::new(native, format)?;
        let snapshot_interval = (rate / self.settings.ui_update_hz.max(1)).max(1) as usize;

        let channels = self.player.channel_count();
        let rate_changed = self.output.as_ref().map_or(true, |o| o.rate != rate);
        let mut ring = self.telemetry.scope_mut();
        if rate_changed || ring.channels() != channels {
            if self.settings.scopes {
                if let Err(e) = ring.configure(channels, self.settings.scope_seconds, rate) {
                    log::warn!("engine: {}; oscilloscopes disabled", e);
                }
            } else {
                ring.configure(0, 0.0, rate).ok();
            }
        }
        ring.reset(self.clock.current);
        drop(ring);

        log::debug!(
            "engine: output {:?} at {} Hz (native {} channel(s), identity: {})",
            format,
            rate,
            native.channels,
            plan.is_identity()
        );
        self.output = Some(OutputConfig { format, rate, plan, snapshot_interval });
        self.until_snapshot = snapshot_interval;
        Ok(())
    }

    fn render(&mut self, count: usize, rate: u32, format: MixFormat, mode: MixMode) -> Result<(), FormatError> {
        if rate == 0 {
            return Err(FormatError::ZeroRate);
        }
        let reconfigure = self
            .output
            .as_ref()
            .map_or(true, |o| o.format != format || o.rate != rate);
        if reconfigure {
            self.configure_output(format, rate)?;
        }

        let full = mode == MixMode::Full;
        self.rendered.clear();
        if !matches!(self.state, EngineState::Playing(_)) {
            self.emit_silence(count, false);
            return Ok(());
        }

        let mut remaining = count;

        while remaining > 0 {
            let interval = self.output.as_ref().map_or(1, |o| o.snapshot_interval);
            let mut chunk = self.clock.frames_to_tick(rate);
            let mut new_tick = true;
            if chunk > remaining {
                chunk = remaining;
                new_tick = false;
            }
            if full && chunk > self.until_snapshot {
                chunk = self.until_snapshot;
                new_tick = false;
            }

            if self.stop_at_loop && self.player.has_looped() {
                if !self.clock.loop_stop_issued {
                    self.clock.loop_stop_issued = true;
                    self.clock.loop_stop_time = Some(self.clock.current);
                    if full {
                        self.telemetry.positions.add(PositionEvent::Stopped, self.clock.current);
                    }
                }
                self.emit_silence(chunk, full);
            } else if chunk > 0 {
                self.render_chunk(chunk, full);
            }

            remaining -= chunk;
            self.clock.advance(chunk, rate);

            if full {
                self.until_snapshot -= chunk;
                if self.until_snapshot == 0 {
                    self.snapshot();
                    self.until_snapshot = interval;
                }
            }

            if new_tick {
                self.tick(rate, mode);
            }
        }
        Ok(())
    }

    fn convert(&mut self) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        self.words.clear();
        self.words.extend(self.pcm.iter().map(|&s| s as u16));
        output.plan.apply(&mut self.words, &mut self.rendered);
    }

    fn native_channels(&self) -> usize {
        self.output.as_ref().map_or(2, |o| o.plan.native.channels as usize)
    }

    fn emit_silence(&mut self, frames: usize, full: bool) {
        if frames == 0 {
            return;
        }
        self.pcm.clear();
        self.pcm.resize(frames * self.native_channels(), 0);
        self.convert();
        if full {
            self.telemetry.scope_mut().push(None, frames);
        }
    }

    fn render_chunk(&mut self, frames: usize, full: bool) {
        let width = self.native_channels();
        let mixer = self.mixers[self.active_mixer].as_mut();
        self.accum.prepare(mixer.domain(), frames * width);

        let taps = full && self.telemetry.scope().is_enabled();
        if taps {
            self.scope_taps.resize_with(mixer.channel_count(), Vec::new);
            for tap in &mut self.scope_taps {
                tap.clear();
                tap.resize(frames, 0);
            }
        }
        let scopes = if taps { Some(self.scope_taps.as_mut_slice()) } else { None };
        mixer.render(&mut self.accum, frames, scopes);

        self.pcm.clear();
        if amplify(&self.accum, mixer.channel_count(), self.amplification, &mut self.pcm) {
            self.clip_smear = CLIP_SMEAR_UPDATES;
        }
        self.convert();

        if full {
            let taps = if taps { Some(self.scope_taps.as_slice()) } else { None };
            self.telemetry.scope_mut().push(taps, frames);
        }
    }

    fn tick(&mut self, rate: u32, mode: MixMode) {
        self.clock.latch_pitchbend();
        let prev_tempo = self.player.position().tempo;
        let prev_time = self.clock.current;

        let t = self.player.tick(self.mixers[self.active_mixer].as_mut());
        self.clock.retime(t);
        if self.clock.next_tick_bent <= self.clock.current {
            log::warn!("engine: sequencer did not advance time, forcing one frame");
            self.clock.next_tick_bent = self.clock.current + 1.0 / rate as f64;
        }

        if mode == MixMode::DryRun || self.clock.loop_stop_issued {
            return;
        }
        let position = self.player.position();
        let snapshot = PositionSnapshot {
            position,
            prev_tempo,
            time: prev_time,
            next_tick_time: self.clock.next_tick_bent,
        };
        let now = self.clock.current;
        self.telemetry.positions.add(PositionEvent::Tick(snapshot), now);
        self.telemetry.songpos.confirm_if(now, |&target| position.songpos == target);
        self.telemetry.tempo.confirm_if(now, |&target| position.tempo == target);
        self.telemetry.bpm.confirm_if(now, |&target| position.bpm == target);
    }

    fn snapshot(&mut self) {
        let now = self.clock.current;
        self.statuses.clear();
        self.mixers[self.active_mixer].dump_status(&mut self.statuses);

        let mut item = Vec::new();
        if item.try_reserve_exact(self.statuses.len()).is_ok() {
            item.extend_from_slice(&self.statuses);
            self.telemetry.channels.add(item, now);
        } else {
            log::debug!("engine: skipped a channel status snapshot");
        }

        self.telemetry.clipping.add(self.clip_smear > 0, now);
        self.clip_smear = self.clip_smear.saturating_sub(1);
    }

    /// Release the device and reset the mixers. Called when the engine thread exits.
    pub fn shutdown(&mut self) {
        if self.state != EngineState::Idle {
            self.halt();
        }
        for mixer in &mut self.mixers {
            mixer.reset();
        }
    }
}
