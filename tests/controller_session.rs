//! End-to-end sessions: controller, engine thread and null device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tx_audio::{NullOutput, Pacing};
use tx_engine::{DeviceContext, DeviceError, OutputDevice, PlayClock, PositionEvent, SampleBuf};
use tx_master::{render_song, Cell, Controller, EngineConfig, Pattern, Song};
use tx_proto::Status;

const TIMEOUT: Duration = Duration::from_secs(10);
const RATE: u32 = 8000;

fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: RATE,
        fragment: 256,
        device: "null".into(),
        ..EngineConfig::default()
    }
}

/// One 4-row pattern at speed 1: loops after 80 ms.
fn short_song() -> Song {
    let mut song = Song::with_channels("short", 2);
    song.initial_speed = 1;
    song.samples = vec![Arc::new(
        SampleBuf::new(1, (0..100).map(|i| (i * 300 - 15000) as i16).collect(), RATE).looped(0, 100),
    )];
    let mut pattern = Pattern::new(4, 2);
    pattern.set(0, 0, Cell::Note { note: 60, sample: 1, volume: 1.0 });
    pattern.set(2, 1, Cell::Note { note: 67, sample: 1, volume: 0.5 });
    song.patterns.push(pattern);
    song.order = vec![0];
    song
}

fn fast_device() -> (NullOutput, Arc<std::sync::Mutex<Vec<u8>>>) {
    let mut dev = NullOutput::new(RATE, 256, Pacing::Fast);
    let captured = dev.capture();
    (dev, captured)
}

#[test]
fn song_stops_at_its_loop_point() {
    let (dev, captured) = fast_device();
    let ctrl = Controller::with_device(config(), short_song(), Box::new(dev)).unwrap();
    ctrl.play_song(0, 0, false).unwrap();
    assert_eq!(ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStarted), Some(Status::PlayingStarted));
    assert_eq!(ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStopped), Some(Status::PlayingStopped));

    let mut events = Vec::new();
    ctrl.telemetry().positions.foreach(f64::INFINITY, |t, e| events.push((t, e)));
    let stops: Vec<f64> = events
        .iter()
        .filter(|(_, e)| *e == PositionEvent::Stopped)
        .map(|&(t, _)| t)
        .collect();
    assert_eq!(stops.len(), 1);
    assert!((stops[0] - 0.08).abs() < 1e-6);
    assert_eq!(events.last().map(|(_, e)| *e), Some(PositionEvent::Stopped));
    assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    let ticks = events.iter().filter(|(_, e)| matches!(e, PositionEvent::Tick(_))).count();
    assert!(ticks >= 4);

    // The device heard the same audio an offline render produces.
    let offline = render_song(&short_song(), &config(), 0, 10.0).unwrap();
    assert_eq!(offline.len(), 640 * 2);
    let bytes = captured.lock().unwrap();
    let heard: Vec<i16> = bytes.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])).collect();
    assert!(heard.len() >= offline.len());
    assert_eq!(&heard[..offline.len()], &offline[..]);
    assert!(heard[offline.len()..].iter().all(|&s| s == 0));
}

#[test]
fn parameter_changes_are_confirmed_during_playback() {
    let (dev, _) = fast_device();
    let ctrl = Controller::with_device(config(), short_song(), Box::new(dev)).unwrap();
    ctrl.play_song(0, 0, true).unwrap();
    ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStarted).unwrap();

    let at = ctrl.set_bpm(250, TIMEOUT).unwrap().expect("bpm confirmed");
    assert!(at > 0.0);
    assert!(ctrl.set_tempo(2, TIMEOUT).unwrap().is_some());
    assert!(ctrl.stop(TIMEOUT).unwrap());
    assert!(ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStopped).is_some());
}

#[test]
fn stop_returns_once_the_device_is_released() {
    let (dev, captured) = fast_device();
    let ctrl = Controller::with_device(config(), short_song(), Box::new(dev)).unwrap();
    // Looping a one-pattern song keeps the engine at song position 0.
    for _ in 0..5 {
        ctrl.play_song(0, 0, true).unwrap();
        ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStarted).unwrap();
        let before = captured.lock().unwrap().len();
        let deadline = Instant::now() + TIMEOUT;
        while captured.lock().unwrap().len() <= before {
            assert!(Instant::now() < deadline, "playback never produced audio");
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(ctrl.stop(TIMEOUT).unwrap());
        let heard = captured.lock().unwrap().len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(captured.lock().unwrap().len(), heard);
        assert_eq!(
            ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStopped),
            Some(Status::PlayingStopped)
        );
    }
}

#[test]
fn polled_telemetry_queues_stay_short() {
    let (dev, _) = fast_device();
    let ctrl = Controller::with_device(config(), short_song(), Box::new(dev)).unwrap();
    ctrl.play_song(0, 0, true).unwrap();
    ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingStarted).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while ctrl.play_time() < 0.5 {
        assert!(Instant::now() < deadline, "play clock stalled");
        if let Some(status) = ctrl.channel_status() {
            assert_eq!(status.len(), 2);
        }
        ctrl.clipping();
        ctrl.position();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(ctrl.stop(TIMEOUT).unwrap());
    ctrl.channel_status();
    ctrl.clipping();

    // Only snapshots from the fragment the device never played remain.
    let t = ctrl.telemetry();
    assert!(t.channels.len() <= 4, "{} channel snapshots left", t.channels.len());
    assert!(t.clipping.len() <= 4, "{} clip snapshots left", t.clipping.len());
}

#[test]
fn idle_requests_confirm_immediately() {
    let (dev, _) = fast_device();
    let ctrl = Controller::with_device(config(), Song::demo(), Box::new(dev)).unwrap();
    assert_eq!(ctrl.set_song_position(1, TIMEOUT).unwrap(), Some(0.0));
    assert!(ctrl.set_bpm(140, TIMEOUT).unwrap().is_some());
    assert!(ctrl.stop(TIMEOUT).unwrap());
}

#[test]
fn notes_start_note_mode() {
    let (dev, captured) = fast_device();
    let ctrl = Controller::with_device(config(), Song::demo(), Box::new(dev)).unwrap();
    ctrl.play_note(0, 60, 1).unwrap();
    assert!(ctrl.wait_status(TIMEOUT, |s| *s == Status::PlayingNoteStarted).is_some());

    let deadline = Instant::now() + TIMEOUT;
    while !captured.lock().unwrap().iter().any(|&b| b != 0) {
        assert!(Instant::now() < deadline, "note never became audible");
        std::thread::sleep(Duration::from_millis(1));
    }
    ctrl.key_off(0).unwrap();
    assert!(ctrl.stop(TIMEOUT).unwrap());
    assert!(ctrl.play_time() > 0.0);
}

struct BrokenDevice {
    clock: PlayClock,
}

impl OutputDevice for BrokenDevice {
    fn name(&self) -> &str {
        "broken"
    }
    fn open(&mut self, _ctx: DeviceContext) -> Result<(), DeviceError> {
        Err(DeviceError::Os { code: 16, message: "device busy".into() })
    }
    fn release(&mut self) {}
    fn commit(&mut self, _data: &[u8]) {}
    fn clock(&self) -> PlayClock {
        self.clock.clone()
    }
}

#[test]
fn failed_open_is_reported() {
    let dev = BrokenDevice { clock: PlayClock::new() };
    let ctrl = Controller::with_device(config(), Song::demo(), Box::new(dev)).unwrap();
    ctrl.play_song(0, 0, true).unwrap();
    assert!(ctrl.wait_status(TIMEOUT, |s| *s == Status::DriverOpenFailed).is_some());
    assert_eq!(
        ctrl.wait_status(TIMEOUT, |s| matches!(s, Status::Errno { .. })),
        Some(Status::Errno { code: 16, text: "device busy".into() })
    );
}

#[test]
fn unknown_names_are_rejected() {
    let cfg = EngineConfig { device: "jack".into(), ..config() };
    assert!(matches!(
        Controller::new(cfg, Song::demo()),
        Err(tx_master::ControllerError::UnknownDevice(_))
    ));
    let (dev, _) = fast_device();
    let cfg = EngineConfig { mixer: "sinc".into(), ..config() };
    assert!(matches!(
        Controller::with_device(cfg, Song::demo(), Box::new(dev)),
        Err(tx_master::ControllerError::UnknownMixer(_))
    ));
}
