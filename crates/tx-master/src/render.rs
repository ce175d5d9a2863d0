//! Offline rendering: drive an engine without a device or a thread.

use tx_engine::mixers::{standard_mixers, MIXER_NAMES};
use tx_engine::{AudioEngine, MixMode, PlayMode};
use tx_proto::{Command, MixFormat};

use crate::config::EngineConfig;
use crate::error::ControllerError;
use crate::sequencer::StepSequencer;
use crate::song::Song;

/// Index of `name` in the bundled mixer registry.
pub(crate) fn mixer_index(name: &str) -> Result<u32, ControllerError> {
    MIXER_NAMES
        .iter()
        .position(|&n| n == name)
        .map(|i| i as u32)
        .ok_or_else(|| ControllerError::UnknownMixer(name.into()))
}

/// Render `song` from `songpos` until it loops or `max_seconds` pass.
///
/// Returns interleaved 16-bit stereo at `config.sample_rate`. Rendering is
/// a dry run: no telemetry is published.
pub fn render_song(
    song: &Song,
    config: &EngineConfig,
    songpos: u32,
    max_seconds: f64,
) -> Result<Vec<i16>, ControllerError> {
    config.validate()?;
    let mixer = mixer_index(&config.mixer)?;
    let mut engine = AudioEngine::new(
        Box::new(StepSequencer::new(song.clone())),
        standard_mixers(),
        config.settings(),
    );
    engine.dispatch(Command::SetMixer { index: mixer });
    if !engine.begin(PlayMode::Song, false, |p, m| p.init_song(m, songpos, 0)) {
        return Err(ControllerError::BadStartPosition(songpos));
    }

    let rate = config.sample_rate;
    let format = MixFormat::native_s16_stereo();
    let max_frames = (max_seconds.max(0.0) * rate as f64) as usize;
    let mut pcm = Vec::with_capacity(max_frames * 2);
    let mut frames = 0;

    while frames < max_frames && !engine.loop_reached() {
        let count = config.fragment.min(max_frames - frames);
        let bytes = engine.mix(count, rate, format, MixMode::DryRun)?;
        pcm.extend(bytes.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])));
        frames += count;
    }

    // Drop the silent tail after the loop point.
    if let Some(stop) = engine.clock().loop_stop_time {
        let end = ((stop * rate as f64).round() as usize).min(frames);
        pcm.truncate(end * 2);
    }
    log::info!("rendered {} frames of {:?} at {} Hz", pcm.len() / 2, song.title, rate);
    Ok(pcm)
}
