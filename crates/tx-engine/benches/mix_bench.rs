use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tx_engine::mixers::create_mixer;
use tx_engine::{
    AudioEngine, ConversionPlan, EngineSettings, MixMode, Mixer, NoteRequest, PatternRequest, PlayMode,
    Player, Position, SampleBuf,
};
use tx_proto::MixFormat;

/// Retriggers a looping sample on every channel each row.
struct Drone {
    channels: usize,
    sample: Arc<SampleBuf>,
    time: f64,
    ticks: u32,
}

impl Drone {
    fn new(channels: usize) -> Self {
        let data = (0..8192).map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16).collect();
        Self {
            channels,
            sample: Arc::new(SampleBuf::new(1, data, 44100).looped(0, 8192)),
            time: 0.0,
            ticks: 0,
        }
    }
}

impl Player for Drone {
    fn channel_count(&self) -> usize {
        self.channels
    }
    fn reset(&mut self, _: &mut dyn Mixer) {}
    fn sample(&self, _: u32) -> Option<Arc<SampleBuf>> {
        Some(self.sample.clone())
    }
    fn init_song(&mut self, _: &mut dyn Mixer, _: u32, _: u32) -> bool {
        self.time = 0.0;
        true
    }
    fn init_pattern(&mut self, _: &mut dyn Mixer, _: &PatternRequest) -> bool {
        true
    }
    fn init_note_mode(&mut self, _: &mut dyn Mixer) {}
    fn tick(&mut self, mixer: &mut dyn Mixer) -> f64 {
        if self.ticks % 6 == 0 {
            for ch in 0..self.channels {
                mixer.start_note(ch, self.sample.clone(), 0);
                mixer.set_frequency(ch, 22050.0 + ch as f32 * 1000.0);
                mixer.set_panning(ch, if ch % 2 == 0 { -0.5 } else { 0.5 });
            }
        }
        self.ticks += 1;
        self.time += 0.02;
        self.time
    }
    fn position(&self) -> Position {
        Position::default()
    }
    fn has_looped(&self) -> bool {
        false
    }
    fn set_song_position(&mut self, _: u32) {}
    fn set_pattern(&mut self, _: u32) {}
    fn set_tempo(&mut self, _: i32) {}
    fn set_bpm(&mut self, _: i32) {}
    fn play_note(&mut self, _: &mut dyn Mixer, _: &NoteRequest) {}
    fn key_off(&mut self, _: &mut dyn Mixer, _: usize) {}
    fn stop_note(&mut self, _: &mut dyn Mixer, _: usize) {}
    fn stop(&mut self, _: &mut dyn Mixer) {}
}

fn bench_mix(c: &mut Criterion) {
    let format = MixFormat::native_s16_stereo();
    for name in ["integer", "float"] {
        let Some(mixer) = create_mixer(name) else { continue };
        let mut engine = AudioEngine::new(Box::new(Drone::new(8)), vec![mixer], EngineSettings::default());
        engine.begin(PlayMode::Song, true, |p, m| p.init_song(m, 0, 0));

        c.bench_function(&format!("mix_1024_frames_8ch_{}", name), |b| {
            b.iter(|| {
                let out = engine.mix(1024, 44100, format, MixMode::Full).unwrap();
                black_box(out.len());
            })
        });
    }
}

fn bench_convert(c: &mut Criterion) {
    let native = MixFormat::native_s16_stereo();
    let target = MixFormat { bits: 8, signed: false, big_endian: false, channels: 1 };
    let plan = ConversionPlan::new(native, target).unwrap();
    let source: Vec<u16> = (0..2048u32).map(|i| (i * 31) as u16).collect();
    let mut words = Vec::with_capacity(source.len());
    let mut out = Vec::with_capacity(source.len());

    c.bench_function("convert_s16_stereo_to_u8_mono", |b| {
        b.iter(|| {
            words.clear();
            words.extend_from_slice(&source);
            out.clear();
            plan.apply(&mut words, &mut out);
            black_box(out.len());
        })
    });
}

criterion_group!(benches, bench_mix, bench_convert);
criterion_main!(benches);
