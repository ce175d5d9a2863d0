//! The engine thread: receive commands, dispatch, repeat.

use std::io;
use std::thread::{self, JoinHandle};

use tx_proto::{ChannelError, CommandReceiver};

use crate::engine::{AudioEngine, Flow};
use crate::rt::promote_current_thread;

/// Run `engine` on a dedicated, named thread fed by `commands`.
///
/// The thread exits on [`tx_proto::Command::Quit`], when every sender is
/// gone, or on a protocol error.
pub fn spawn_engine_thread(engine: AudioEngine, commands: CommandReceiver) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("tx-engine".into())
        .spawn(move || {
            promote_current_thread();
            run(engine, commands);
        })
}

/// The dispatch loop. Runs on the calling thread until the channel ends.
pub fn run(mut engine: AudioEngine, mut commands: CommandReceiver) {
    log::info!("engine thread started");
    loop {
        match commands.recv() {
            Ok(command) => {
                if engine.dispatch(command) == Flow::Quit {
                    log::info!("engine thread: quit requested");
                    break;
                }
            }
            Err(ChannelError::Disconnected) => {
                log::info!("engine thread: command channel closed");
                break;
            }
            Err(e) => {
                log::error!("engine thread: fatal command channel error: {}", e);
                break;
            }
        }
    }
    engine.shutdown();
    log::info!("engine thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::mixers::standard_mixers;
    use crate::mixer::{Mixer, SampleBuf};
    use crate::player::{NoteRequest, PatternRequest, Player, Position};
    use std::io::Write;
    use std::sync::Arc;
    use tx_proto::{pipe, Command, Status};

    /// A player that never sequences anything.
    struct Silent {
        position: Position,
    }

    impl Player for Silent {
        fn channel_count(&self) -> usize {
            2
        }
        fn reset(&mut self, _: &mut dyn Mixer) {}
        fn sample(&self, _: u32) -> Option<Arc<SampleBuf>> {
            None
        }
        fn init_song(&mut self, _: &mut dyn Mixer, _: u32, _: u32) -> bool {
            true
        }
        fn init_pattern(&mut self, _: &mut dyn Mixer, _: &PatternRequest) -> bool {
            true
        }
        fn init_note_mode(&mut self, _: &mut dyn Mixer) {}
        fn tick(&mut self, _: &mut dyn Mixer) -> f64 {
            self.position.tick += 1;
            self.position.tick as f64 * 0.02
        }
        fn position(&self) -> Position {
            self.position
        }
        fn has_looped(&self) -> bool {
            false
        }
        fn set_song_position(&mut self, songpos: u32) {
            self.position.songpos = songpos;
        }
        fn set_pattern(&mut self, _: u32) {}
        fn set_tempo(&mut self, tempo: i32) {
            self.position.tempo = tempo;
        }
        fn set_bpm(&mut self, bpm: i32) {
            self.position.bpm = bpm;
        }
        fn play_note(&mut self, _: &mut dyn Mixer, _: &NoteRequest) {}
        fn key_off(&mut self, _: &mut dyn Mixer, _: usize) {}
        fn stop_note(&mut self, _: &mut dyn Mixer, _: usize) {}
        fn stop(&mut self, _: &mut dyn Mixer) {}
    }

    fn engine() -> AudioEngine {
        let player = Silent { position: Position::default() };
        AudioEngine::new(Box::new(player), standard_mixers(), EngineSettings::default())
    }

    #[test]
    fn quit_ends_the_thread() {
        let (tx, rx) = tx_proto::command_channel();
        let (status, mut status_rx) = tx_proto::status_channel();
        let handle = spawn_engine_thread(engine().with_status(status), rx).unwrap();

        tx.send(&Command::PlaySong { songpos: 0, patpos: 0, looped: true }).unwrap();
        assert_eq!(status_rx.recv().unwrap(), Status::PlayingStarted);
        tx.send(&Command::Quit).unwrap();
        handle.join().unwrap();
        assert_eq!(status_rx.recv().unwrap(), Status::PlayingStopped);
    }

    #[test]
    fn dropped_senders_end_the_thread() {
        let (tx, rx) = tx_proto::command_channel();
        let handle = spawn_engine_thread(engine(), rx).unwrap();
        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn unknown_discriminant_is_fatal() {
        let (mut w, r) = pipe(64);
        let handle = spawn_engine_thread(engine(), CommandReceiver::new(r)).unwrap();
        w.write_all(&[0xfe]).unwrap();
        handle.join().unwrap();
        // The engine side is gone.
        assert!(w.write_all(&[0]).is_err());
    }
}
