//! Device epochs: requests from a previous open must not be answered.

use std::sync::Arc;

use tx_audio::{NullOutput, Pacing};
use tx_engine::mixers::standard_mixers;
use tx_engine::{AudioEngine, EngineSettings, EngineState, PlayMode};
use tx_master::{Song, StepSequencer};
use tx_proto::{Command, MixFormat};

fn engine_with_capture() -> (AudioEngine, tx_proto::CommandReceiver, Arc<std::sync::Mutex<Vec<u8>>>) {
    let (tx, rx) = tx_proto::command_channel();
    let mut dev = NullOutput::new(8000, 64, Pacing::Fast);
    let captured = dev.capture();
    let engine = AudioEngine::new(
        Box::new(StepSequencer::new(Song::demo())),
        standard_mixers(),
        EngineSettings::default(),
    )
    .with_device(Box::new(dev), tx);
    (engine, rx, captured)
}

fn play(engine: &mut AudioEngine) {
    engine.dispatch(Command::PlaySong { songpos: 0, patpos: 0, looped: true });
    assert_eq!(engine.state(), EngineState::Playing(PlayMode::Song));
}

#[test]
fn stale_and_idle_requests_are_discarded() {
    let (mut engine, mut rx, captured) = engine_with_capture();
    play(&mut engine);
    assert_eq!(engine.epoch(), 1);

    let request = rx.recv().unwrap();
    let Command::DataRequested { epoch, count, rate, format } = request else {
        panic!("expected a data request, got {:?}", request);
    };
    assert_eq!((epoch, count, rate), (1, 64, 8000));

    engine.dispatch(Command::DataRequested { epoch: 0, count, rate, format });
    assert!(captured.lock().unwrap().is_empty());

    engine.dispatch(request.clone());
    assert_eq!(captured.lock().unwrap().len(), 64 * format.frame_bytes());

    engine.dispatch(Command::StopPlaying);
    assert_eq!(engine.state(), EngineState::Idle);
    engine.dispatch(request.clone());
    assert_eq!(captured.lock().unwrap().len(), 64 * format.frame_bytes());

    // A new open bumps the epoch; the old request stays stale.
    play(&mut engine);
    assert_eq!(engine.epoch(), 2);
    engine.dispatch(request);
    assert_eq!(captured.lock().unwrap().len(), 64 * format.frame_bytes());
    engine.shutdown();
}

#[test]
fn device_format_is_honoured() {
    let (tx, mut rx) = tx_proto::command_channel();
    let target = MixFormat { bits: 8, signed: false, big_endian: false, channels: 1 };
    let mut dev = NullOutput::new(8000, 100, Pacing::Fast).with_format(target);
    let captured = dev.capture();
    let mut engine = AudioEngine::new(
        Box::new(StepSequencer::new(Song::demo())),
        standard_mixers(),
        EngineSettings::default(),
    )
    .with_device(Box::new(dev), tx);

    play(&mut engine);
    let request = rx.recv().unwrap();
    assert!(matches!(request, Command::DataRequested { format, .. } if format == target));
    engine.dispatch(request);
    assert_eq!(captured.lock().unwrap().len(), 100);
    engine.shutdown();
}
