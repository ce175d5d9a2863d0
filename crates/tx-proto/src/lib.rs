//! Message channels between control threads and the trackmix engine thread.
//!
//! Two independent channels exist: the command channel (control → engine)
//! and the status channel (engine → control). Both carry framed,
//! discriminated-union messages over a blocking byte stream and guarantee
//! message-atomic delivery even when the transport hands back short reads.

mod channel;
mod command;
mod error;
mod format;
mod pipe;
mod status;

pub use channel::{
    command_channel, status_channel, CommandReceiver, CommandSender, FrameReader, FrameWriter,
    StatusReceiver, StatusSender,
};
pub use command::{Command, MAX_COMMAND_LEN};
pub use error::ChannelError;
pub use format::MixFormat;
pub use pipe::{pipe, PipeReader, PipeWriter, PIPE_CAPACITY};
pub use status::{Status, MAX_TEXT_LEN};
