//! Headless controller for the trackmix engine.
//!
//! Provides the control-thread side: it starts the engine thread, sends
//! commands, collects status messages, and reads telemetry against the
//! device's play clock. Both the CLI and the integration tests use it.

mod config;
mod error;
mod render;
mod sequencer;
mod song;
mod wav;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tx_engine::mixers::standard_mixers;
use tx_engine::{
    spawn_engine_thread, AudioEngine, ChannelStatus, OutputDevice, PlayClock, PositionEvent, Telemetry,
};
use tx_proto::{ChannelError, Command, CommandSender, Status, StatusReceiver};

pub use config::{ConfigError, EngineConfig};
pub use error::ControllerError;
pub use render::render_song;
pub use sequencer::{note_frequency, StepSequencer};
pub use song::{Cell, Pattern, Song, BASE_NOTE};
pub use wav::{pcm_to_wav, write_wav};

/// Owns an engine thread playing one song.
pub struct Controller {
    song: Song,
    config: EngineConfig,
    commands: CommandSender,
    telemetry: Arc<Telemetry>,
    clock: PlayClock,
    statuses: Receiver<Status>,
    engine: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl Controller {
    /// Start an engine on the device named in `config`.
    pub fn new(config: EngineConfig, song: Song) -> Result<Self, ControllerError> {
        config.validate()?;
        let device = tx_audio::create_device(&config.device, config.sample_rate, config.fragment)
            .ok_or_else(|| ControllerError::UnknownDevice(config.device.clone()))?;
        Self::with_device(config, song, device)
    }

    /// Start an engine on an explicit device.
    pub fn with_device(
        config: EngineConfig,
        song: Song,
        device: Box<dyn OutputDevice>,
    ) -> Result<Self, ControllerError> {
        let mixer = render::mixer_index(&config.mixer)?;
        let (commands, receiver) = tx_proto::command_channel();
        let (status_tx, status_rx) = tx_proto::status_channel();

        // The listener ends on its own once the engine drops its status sender.
        let (forward, statuses) = channel::unbounded();
        let listener = thread::Builder::new()
            .name("tx-status".into())
            .spawn(move || listen(status_rx, forward))
            .map_err(|source| ControllerError::Spawn { name: "status", source })?;

        let clock = device.clock();
        log::info!("controller: {} device, {} mixer", device.name(), config.mixer);
        let engine = AudioEngine::new(
            Box::new(StepSequencer::new(song.clone())),
            standard_mixers(),
            config.settings(),
        )
        .with_device(device, commands.clone())
        .with_status(status_tx);
        let telemetry = engine.telemetry();
        let engine = spawn_engine_thread(engine, receiver)
            .map_err(|source| ControllerError::Spawn { name: "engine", source })?;

        let ctrl = Self {
            song,
            config,
            commands,
            telemetry,
            clock,
            statuses,
            engine: Some(engine),
            listener: Some(listener),
        };
        ctrl.send(&Command::InitPlayer)?;
        ctrl.send(&Command::SetMixer { index: mixer })?;
        Ok(ctrl)
    }

    fn send(&self, command: &Command) -> Result<(), ControllerError> {
        Ok(self.commands.send(command)?)
    }

    /// The song the engine was started with.
    pub fn song(&self) -> &Song {
        &self.song
    }

    /// The active configuration, including the current mixer name.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A sender for raw commands, for callers that need the whole protocol.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    // --- Playback ---

    /// Play the song from `songpos`/`patpos`; without `looped` playback
    /// stops when the song wraps around.
    pub fn play_song(&self, songpos: u32, patpos: u32, looped: bool) -> Result<(), ControllerError> {
        self.send(&Command::PlaySong { songpos, patpos, looped })
    }

    /// Play `pattern` from `patpos` on every channel.
    pub fn play_pattern(&self, pattern: u32, patpos: u32, looped: bool) -> Result<(), ControllerError> {
        self.send(&Command::PlayPattern {
            pattern,
            patpos,
            single_row: false,
            looped,
            stop_pos: -1,
            first_channel: 0,
            channels: 0,
        })
    }

    /// Trigger `note` on `channel`, starting note mode if nothing is playing.
    pub fn play_note(&self, channel: u16, note: u8, instrument: u16) -> Result<(), ControllerError> {
        self.send(&Command::PlayNote { channel, note, instrument, all_channels: false })
    }

    /// Release the note on `channel`; looped samples stop, one-shots play out.
    pub fn key_off(&self, channel: u16) -> Result<(), ControllerError> {
        self.send(&Command::PlayNoteKeyoff { channel })
    }

    /// Cut the note on `channel` immediately.
    pub fn stop_note(&self, channel: u16) -> Result<(), ControllerError> {
        self.send(&Command::StopNote { channel })
    }

    /// Stop playback and wait until the engine has done so.
    ///
    /// Returns false if the engine did not finish stopping within `timeout`.
    /// By the time this returns true the device is released and the
    /// playing-stopped status has been sent.
    pub fn stop(&self, timeout: Duration) -> Result<bool, ControllerError> {
        self.telemetry.stopped.arm(());
        self.send(&Command::StopPlaying)?;
        Ok(self.telemetry.stopped.wait_timeout(timeout).is_some())
    }

    // --- Parameters ---

    /// Jump to `songpos`; returns the engine time the jump took effect.
    pub fn set_song_position(&self, songpos: u32, timeout: Duration) -> Result<Option<f64>, ControllerError> {
        self.telemetry.songpos.arm(songpos);
        self.send(&Command::SetSongPosition { songpos })?;
        Ok(self.telemetry.songpos.wait_timeout(timeout))
    }

    /// Set ticks per row; returns the engine time the change took effect,
    /// or `None` on timeout.
    pub fn set_tempo(&self, tempo: i32, timeout: Duration) -> Result<Option<f64>, ControllerError> {
        self.telemetry.tempo.arm(tempo);
        self.send(&Command::SetTempo { tempo })?;
        Ok(self.telemetry.tempo.wait_timeout(timeout))
    }

    /// Set the tick rate in BPM; returns the engine time the change took
    /// effect, or `None` on timeout.
    pub fn set_bpm(&self, bpm: i32, timeout: Duration) -> Result<Option<f64>, ControllerError> {
        self.telemetry.bpm.arm(bpm);
        self.send(&Command::SetBpm { bpm })?;
        Ok(self.telemetry.bpm.wait_timeout(timeout))
    }

    /// Bend playback speed by `percent`; applied at the next tick.
    pub fn set_pitchbend(&self, percent: f32) -> Result<(), ControllerError> {
        self.send(&Command::SetPitchbend { percent })
    }

    /// Output gain for the float mixer.
    pub fn set_amplification(&self, gain: f32) -> Result<(), ControllerError> {
        self.send(&Command::SetAmplification { gain })
    }

    /// Switch to the mixer called `name` (see `tx_engine::mixers::MIXER_NAMES`).
    pub fn set_mixer(&mut self, name: &str) -> Result<(), ControllerError> {
        let index = render::mixer_index(name)?;
        self.send(&Command::SetMixer { index })?;
        self.config.mixer = name.into();
        Ok(())
    }

    // --- Telemetry ---

    /// Raw access to the engine's queues and synchronizers.
    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Engine time currently audible at the device.
    pub fn play_time(&self) -> f64 {
        self.clock.time()
    }

    /// Sample rate of the open device.
    pub fn play_rate(&self) -> u32 {
        self.clock.rate()
    }

    /// The latest position event at or before the current play time.
    pub fn position(&self) -> Option<PositionEvent> {
        self.telemetry.positions.get(self.play_time())
    }

    /// Whether the mix clipped recently, as of the current play time.
    pub fn clipping(&self) -> Option<bool> {
        self.telemetry.clipping.get(self.play_time())
    }

    /// Per-channel mixer state as of the current play time.
    ///
    /// Like the other telemetry getters this discards older snapshots, so
    /// callers that poll it keep the queue short.
    pub fn channel_status(&self) -> Option<Vec<ChannelStatus>> {
        self.telemetry.channels.get(self.play_time())
    }

    /// The next status message, if one has arrived.
    pub fn try_status(&self) -> Option<Status> {
        self.statuses.try_recv().ok()
    }

    /// Wait for a status matching `want`, dropping others.
    pub fn wait_status(&self, timeout: Duration, want: impl Fn(&Status) -> bool) -> Option<Status> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.statuses.recv_timeout(left) {
                Ok(status) if want(&status) => return Some(status),
                Ok(status) => log::debug!("controller: skipping {:?}", status),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    // --- Offline rendering ---

    /// Render the song once through, as interleaved stereo.
    pub fn render(&self, max_seconds: f64) -> Result<Vec<i16>, ControllerError> {
        render_song(&self.song, &self.config, 0, max_seconds)
    }

    /// Render the song once through and encode it as a WAV file.
    pub fn render_to_wav(&self, max_seconds: f64) -> Result<Vec<u8>, ControllerError> {
        let pcm = self.render(max_seconds)?;
        Ok(pcm_to_wav(&pcm, self.config.sample_rate)?)
    }

    /// Stop playback and end the engine thread.
    pub fn shutdown(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        // The engine holds a sender of its own, so it has to be told to quit.
        if self.commands.send(&Command::Quit).is_err() {
            log::warn!("controller: engine already gone");
        }
        if engine.join().is_err() {
            log::error!("controller: engine thread panicked");
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen(mut statuses: StatusReceiver, forward: channel::Sender<Status>) {
    loop {
        match statuses.recv() {
            Ok(status) => {
                if forward.send(status).is_err() {
                    break;
                }
            }
            Err(ChannelError::Disconnected) => break,
            Err(e) => {
                log::error!("controller: status channel failed: {}", e);
                break;
            }
        }
    }
}
