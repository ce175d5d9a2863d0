//! CPAL-based audio output backend.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on its own device
//! thread for as long as the device is open. That thread also posts the
//! data requests: whenever no request is outstanding and the ring has room
//! for another fragment it asks the engine for one. `commit` pushes the
//! rendered frames into the ring and the stream callback drains it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam::channel;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tx_engine::{DeviceContext, DeviceError, OutputDevice, PlayClock};
use tx_proto::MixFormat;

/// Fragments the ring can hold.
const RING_FRAGMENTS: usize = 4;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    /// A request is waiting for its commit.
    pending: AtomicBool,
    /// Frames in the ring not yet played.
    queued: AtomicUsize,
}

struct Session {
    shared: Arc<Shared>,
    producer: HeapProd<i16>,
    thread: JoinHandle<()>,
}

/// CPAL-based audio output on the default host's default device.
pub struct CpalOutput {
    fragment: usize,
    clock: PlayClock,
    scratch: Vec<i16>,
    session: Option<Session>,
}

impl CpalOutput {
    /// Output on the default host device, requesting `fragment` frames at a time.
    pub fn new(fragment: usize) -> Self {
        Self {
            fragment: fragment.max(1),
            clock: PlayClock::new(),
            scratch: Vec::new(),
            session: None,
        }
    }
}

/// Build and start a stream on the default device. Always stereo; the
/// callback assumes two-channel interleaving.
fn start_stream(
    shared: &Arc<Shared>,
    clock: &PlayClock,
    capacity: usize,
) -> Result<(cpal::Stream, u32, HeapProd<i16>), DeviceError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
    let config = device
        .default_output_config()
        .map_err(|e| DeviceError::Open(e.to_string()))?;
    let mut config: StreamConfig = config.into();
    config.channels = 2;
    let rate = config.sample_rate.0;

    let (producer, mut consumer): (HeapProd<i16>, HeapCons<i16>) = HeapRb::<i16>::new(capacity * 2).split();
    let shared_cb = shared.clone();
    let clock_cb = clock.clone();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut played = 0;
                for frame in data.chunks_mut(2) {
                    if consumer.occupied_len() < 2 {
                        frame.fill(0.0);
                        continue;
                    }
                    for sample in frame.iter_mut() {
                        *sample = consumer.try_pop().map_or(0.0, |s| s as f32 / 32768.0);
                    }
                    played += 1;
                }
                if played > 0 {
                    // May run ahead of the commit's count update.
                    let _ = shared_cb
                        .queued
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| Some(q.saturating_sub(played)));
                    clock_cb.advance(played);
                }
            },
            |err| log::error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok((stream, rate, producer))
}

fn device_thread(
    ctx: DeviceContext,
    shared: Arc<Shared>,
    clock: PlayClock,
    fragment: usize,
    opened: channel::Sender<Result<HeapProd<i16>, DeviceError>>,
) {
    let capacity = fragment * RING_FRAGMENTS;
    let (stream, rate) = match start_stream(&shared, &clock, capacity) {
        Ok((stream, rate, producer)) => {
            clock.set_rate(rate);
            if opened.send(Ok(producer)).is_err() {
                return;
            }
            (stream, rate)
        }
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    log::info!("cpal device: {} Hz, fragment {} frames", rate, fragment);

    let format = MixFormat::native_s16_stereo();
    while shared.running.load(Ordering::Acquire) {
        let queued = shared.queued.load(Ordering::Acquire);
        if !shared.pending.load(Ordering::Acquire) && queued + fragment <= capacity {
            shared.pending.store(true, Ordering::Release);
            if ctx.request(fragment as u32, rate, format).is_err() {
                break;
            }
        } else {
            thread::sleep(IDLE_SLEEP);
        }
    }
    if let Err(e) = stream.pause() {
        log::warn!("cpal device: pause failed: {}", e);
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, ctx: DeviceContext) -> Result<(), DeviceError> {
        if self.session.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        self.clock.set_time(0.0);

        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::Release);
        let (opened, result) = channel::bounded(1);
        let thread = {
            let shared = shared.clone();
            let clock = self.clock.clone();
            let fragment = self.fragment;
            thread::Builder::new()
                .name("tx-cpal".into())
                .spawn(move || device_thread(ctx, shared, clock, fragment, opened))?
        };

        let outcome = result
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::Open("device thread exited".into())));
        match outcome {
            Ok(producer) => {
                self.session = Some(Session { shared, producer, thread });
                Ok(())
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.shared.running.store(false, Ordering::Release);
        if session.thread.join().is_err() {
            log::warn!("cpal device: device thread panicked");
        }
    }

    fn commit(&mut self, data: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.scratch.clear();
        self.scratch
            .extend(data.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])));
        let pushed = session.producer.push_slice(&self.scratch);
        if pushed < self.scratch.len() {
            log::debug!("cpal device: ring full, dropped {} samples", self.scratch.len() - pushed);
        }
        session.shared.queued.fetch_add(pushed / 2, Ordering::AcqRel);
        session.shared.pending.store(false, Ordering::Release);
    }

    fn clock(&self) -> PlayClock {
        self.clock.clone()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.release();
    }
}
