//! Error types for the mixing engine.

use thiserror::Error;
use tx_proto::Status;

/// Output format negotiation failures. Fatal for the current playback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("mixer '{0}' offers no usable sample depth")]
    NoUsableDepth(&'static str),
    #[error("unsupported sample depth: {0} bits")]
    UnsupportedDepth(u8),
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
    #[error("mix rate must be non-zero")]
    ZeroRate,
}

/// Output device failures.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no audio device available")]
    NoDevice,
    #[error("device is already open")]
    AlreadyOpen,
    #[error("could not open device: {0}")]
    Open(String),
    #[error("could not start stream: {0}")]
    Stream(String),
    #[error("{message} (os error {code})")]
    Os { code: i32, message: String },
}

impl DeviceError {
    /// Status reported to the control side after [`Status::DriverOpenFailed`].
    pub fn to_status(&self) -> Status {
        match self {
            DeviceError::Os { code, message } => Status::Errno {
                code: *code,
                text: message.clone(),
            },
            other => Status::Error(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error() {
            Some(code) => DeviceError::Os { code, message: e.to_string() },
            None => DeviceError::Open(e.to_string()),
        }
    }
}

/// Oscilloscope buffer allocation failure. Scopes get disabled, mixing goes on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("could not allocate {frames} scope frames for {channels} channels")]
pub struct ScopeAllocError {
    pub channels: usize,
    pub frames: usize,
}
