//! Channel error type.

use thiserror::Error;

/// Errors raised while framing, sending or receiving channel messages.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The peer closed its end cleanly at a message boundary.
    #[error("channel disconnected")]
    Disconnected,

    /// The peer closed its end in the middle of a message.
    #[error("channel closed mid-message ({got} of {expected} bytes)")]
    Truncated { got: usize, expected: usize },

    /// A discriminant that no message shape is registered for.
    #[error("unknown message discriminant {0:#04x}")]
    UnknownDiscriminant(u8),

    /// A frame whose declared length or content does not match its shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Status text longer than the u16 length prefix can describe.
    #[error("message text too long ({0} bytes)")]
    TextTooLong(usize),

    /// binrw failed to encode or decode a payload.
    #[error("codec error: {0}")]
    Codec(String),

    /// The transport refused a write.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// The transport failed while reading.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
}

impl ChannelError {
    /// True for errors that mean the stream can no longer be trusted.
    ///
    /// A receiving loop must stop on these; a clean disconnect is not a
    /// protocol violation but also ends the loop.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ChannelError::UnknownDiscriminant(_)
                | ChannelError::Malformed(_)
                | ChannelError::Truncated { .. }
                | ChannelError::Codec(_)
        )
    }
}

impl From<binrw::Error> for ChannelError {
    fn from(e: binrw::Error) -> Self {
        ChannelError::Codec(e.to_string())
    }
}
