//! A device with no hardware behind it.
//!
//! Requests one fragment at a time and waits for the engine to commit it.
//! In real-time mode it sleeps for the fragment's duration before asking
//! again, so play time tracks the wall clock; in fast mode it runs as fast
//! as the engine can render. Committed bytes can be captured for tests.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tx_engine::{DeviceContext, DeviceError, OutputDevice, PlayClock};
use tx_proto::MixFormat;

/// How often a waiting pump re-checks for release.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep one fragment's worth of time per fragment.
    RealTime,
    /// Request the next fragment as soon as the last one is committed.
    Fast,
}

#[derive(Clone, Copy)]
struct PumpConfig {
    fragment: usize,
    rate: u32,
    format: MixFormat,
    pacing: Pacing,
}

struct Session {
    running: Arc<AtomicBool>,
    committed: Sender<usize>,
    pump: JoinHandle<()>,
}

pub struct NullOutput {
    rate: u32,
    fragment: usize,
    format: MixFormat,
    pacing: Pacing,
    clock: PlayClock,
    capture: Option<Arc<Mutex<Vec<u8>>>>,
    session: Option<Session>,
}

impl NullOutput {
    /// A null device asking for `fragment` frames at a time.
    pub fn new(rate: u32, fragment: usize, pacing: Pacing) -> Self {
        Self {
            rate,
            fragment: fragment.max(1),
            format: MixFormat::native_s16_stereo(),
            pacing,
            clock: PlayClock::new(),
            capture: None,
            session: None,
        }
    }

    /// Request `format` instead of native 16-bit stereo.
    pub fn with_format(mut self, format: MixFormat) -> Self {
        self.format = format;
        self
    }

    /// Keep every committed byte; returns the shared buffer.
    pub fn capture(&mut self) -> Arc<Mutex<Vec<u8>>> {
        self.capture.get_or_insert_with(Default::default).clone()
    }
}

fn pump(ctx: DeviceContext, running: Arc<AtomicBool>, committed: Receiver<usize>, clock: PlayClock, cfg: PumpConfig) {
    let fragment_time = Duration::from_secs_f64(cfg.fragment as f64 / cfg.rate as f64);
    'session: while running.load(Ordering::Acquire) {
        if ctx.request(cfg.fragment as u32, cfg.rate, cfg.format).is_err() {
            break;
        }
        let frames = loop {
            match committed.recv_timeout(POLL_INTERVAL) {
                Ok(frames) => break frames,
                Err(RecvTimeoutError::Timeout) if running.load(Ordering::Acquire) => {}
                Err(_) => break 'session,
            }
        };
        if cfg.pacing == Pacing::RealTime {
            thread::sleep(fragment_time);
        }
        clock.advance(frames);
    }
    log::debug!("null device: pump finished");
}

impl OutputDevice for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&mut self, ctx: DeviceContext) -> Result<(), DeviceError> {
        if self.session.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        self.clock.set_rate(self.rate);
        self.clock.set_time(0.0);

        let running = Arc::new(AtomicBool::new(true));
        let (committed, acks) = channel::bounded(1);
        let pump = {
            let running = running.clone();
            let clock = self.clock.clone();
            let cfg = PumpConfig {
                fragment: self.fragment,
                rate: self.rate,
                format: self.format,
                pacing: self.pacing,
            };
            thread::Builder::new()
                .name("tx-null-pump".into())
                .spawn(move || pump(ctx, running, acks, clock, cfg))?
        };
        self.session = Some(Session { running, committed, pump });
        Ok(())
    }

    fn release(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.running.store(false, Ordering::Release);
        drop(session.committed);
        if session.pump.join().is_err() {
            log::warn!("null device: pump thread panicked");
        }
    }

    fn commit(&mut self, data: &[u8]) {
        if let Some(capture) = &self.capture {
            capture.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(data);
        }
        if let Some(session) = &self.session {
            let frames = data.len() / self.format.frame_bytes().max(1);
            // The pump has at most one request outstanding.
            let _ = session.committed.try_send(frames);
        }
    }

    fn clock(&self) -> PlayClock {
        self.clock.clone()
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tx_proto::Command;

    #[test]
    fn requests_wait_for_commit() {
        let (tx, mut rx) = tx_proto::command_channel();
        let mut dev = NullOutput::new(1000, 100, Pacing::Fast);
        let captured = dev.capture();
        dev.open(DeviceContext::new(4, tx)).unwrap();

        for _ in 0..3 {
            match rx.recv().unwrap() {
                Command::DataRequested { epoch, count, rate, format } => {
                    assert_eq!((epoch, count, rate), (4, 100, 1000));
                    dev.commit(&vec![0u8; count as usize * format.frame_bytes()]);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        dev.release();

        assert_eq!(captured.lock().unwrap().len(), 3 * 400);
        assert!(dev.play_time() >= 0.2);
        assert_eq!(dev.play_rate(), 1000);
    }

    #[test]
    fn double_open_is_refused() {
        let (tx, _rx) = tx_proto::command_channel();
        let mut dev = NullOutput::new(1000, 10, Pacing::Fast);
        dev.open(DeviceContext::new(1, tx.clone())).unwrap();
        assert!(matches!(dev.open(DeviceContext::new(2, tx)), Err(DeviceError::AlreadyOpen)));
        dev.release();
    }

    #[test]
    fn release_without_commit_does_not_hang() {
        let (tx, _rx) = tx_proto::command_channel();
        let mut dev = NullOutput::new(1000, 10, Pacing::RealTime);
        dev.open(DeviceContext::new(1, tx)).unwrap();
        dev.release();
        dev.release();
    }
}
