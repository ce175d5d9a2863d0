//! trackmix CLI: plays the built-in demo song or renders it to WAV.
//!
//! Usage:
//!   tx-cli [--config file.toml] [--seconds N]
//!   tx-cli [--config file.toml] --wav output.wav [--seconds N]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, process};

use tx_engine::PositionEvent;
use tx_master::{Controller, EngineConfig, Song};
use tx_proto::Status;

const USAGE: &str = "Usage: tx-cli [--config file.toml] [--wav output.wav] [--seconds N]";

struct Args {
    config: Option<PathBuf>,
    wav: Option<PathBuf>,
    seconds: f64,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args { config: None, wav: None, seconds: 60.0 };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--config" => args.config = Some(value()?.into()),
            "--wav" => args.wav = Some(value()?.into()),
            "--seconds" => {
                let v = value()?;
                args.seconds = v.parse().map_err(|_| format!("bad --seconds value {:?}", v))?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            other => return Err(format!("unknown argument {:?}", other)),
        }
    }
    Ok(args)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args().unwrap_or_else(|e| {
        eprintln!("{}\n{}", e, USAGE);
        process::exit(2);
    });
    let config = EngineConfig::load(args.config.as_deref());
    log::debug!("{:?}", config);
    let song = Song::demo();

    println!("Title:    {}", song.title);
    println!("Channels: {}", song.channels);
    println!("Patterns: {}", song.patterns.len());
    println!("Orders:   {}", song.order.len());
    println!("Tempo:    {} BPM, Speed: {}", song.initial_bpm, song.initial_speed);
    println!("Mixer:    {}", config.mixer);
    println!();

    let result = match &args.wav {
        Some(path) => render_to_wav(config, song, path, args.seconds),
        None => play_audio(config, song, args.seconds),
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn play_audio(config: EngineConfig, song: Song, seconds: f64) -> Result<(), Box<dyn std::error::Error>> {
    let ctrl = Controller::new(config, song)?;
    ctrl.play_song(0, 0, false)?;
    println!("Playing on the {} device...", ctrl.config().device);
    println!();

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut active = 0;
    let mut clipping = false;
    while Instant::now() < deadline {
        match ctrl.try_status() {
            Some(Status::PlayingStopped) => break,
            Some(Status::DriverOpenFailed) => return Err("could not open the output device".into()),
            Some(status) if status.is_failure() => return Err(format!("{:?}", status).into()),
            _ => {}
        }
        // Polling drains the telemetry queues up to the play time.
        if let Some(channels) = ctrl.channel_status() {
            active = channels.iter().filter(|c| c.sample.is_some()).count();
        }
        if let Some(clip) = ctrl.clipping() {
            clipping = clip;
        }
        if let Some(PositionEvent::Tick(snap)) = ctrl.position() {
            print!(
                "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X} | Voices: {} | {:6.2}s {}",
                snap.position.songpos,
                snap.position.pattern,
                snap.position.patpos,
                active,
                ctrl.play_time(),
                if clipping { "CLIP" } else { "    " }
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    ctrl.stop(Duration::from_secs(1))?;
    println!("\rDone.                                        ");
    Ok(())
}

fn render_to_wav(
    config: EngineConfig,
    song: Song,
    path: &Path,
    seconds: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Rendering to {} at {} Hz...", path.display(), config.sample_rate);
    let pcm = tx_master::render_song(&song, &config, 0, seconds)?;
    println!("Rendered {} frames", pcm.len() / 2);
    let file = File::create(path).map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
    let mut out = BufWriter::new(file);
    tx_master::write_wav(&mut out, &pcm, 2, config.sample_rate)
        .and_then(|()| out.flush())
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
    println!("Done.");
    Ok(())
}
