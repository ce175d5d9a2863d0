use thiserror::Error;
use tx_engine::FormatError;
use tx_proto::ChannelError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown output device {0:?}")]
    UnknownDevice(String),

    #[error("unknown mixer {0:?}")]
    UnknownMixer(String),

    #[error("could not start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("engine unreachable: {0}")]
    Channel(#[from] ChannelError),

    #[error("render failed: {0}")]
    Render(#[from] FormatError),

    #[error("song cannot start at position {0}")]
    BadStartPosition(u32),

    #[error("WAV output failed: {0}")]
    Wav(#[from] std::io::Error),
}
