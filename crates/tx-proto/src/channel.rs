//! Framed channels with message-atomic delivery.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::command::{Command, MAX_COMMAND_LEN};
use crate::error::ChannelError;
use crate::pipe::{pipe, PIPE_CAPACITY};
use crate::status::{Shape, Status};

/// Writes whole frames to a byte transport.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one complete frame or fail.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.inner.write_all(frame).map_err(ChannelError::Write)?;
        self.inner.flush().map_err(ChannelError::Write)
    }
}

/// Reads exact byte counts from a transport that may deliver short chunks.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Fill `buf` completely, accumulating partial reads.
    ///
    /// `at_boundary` marks the first read of a message: EOF there is a clean
    /// disconnect, anywhere else it truncates a message.
    pub fn fill(&mut self, buf: &mut [u8], at_boundary: bool) -> Result<(), ChannelError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 && at_boundary => return Err(ChannelError::Disconnected),
                Ok(0) => {
                    return Err(ChannelError::Truncated { got: filled, expected: buf.len() })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) => return Err(ChannelError::Read(e)),
            }
        }
        Ok(())
    }
}

type SharedWriter = Arc<Mutex<FrameWriter<Box<dyn Write + Send>>>>;

/// Sending half of the command channel.
///
/// Clones share one writer behind a mutex so several threads can feed the
/// same engine without interleaving frames.
#[derive(Clone)]
pub struct CommandSender {
    writer: SharedWriter,
}

impl CommandSender {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(FrameWriter::new(Box::new(writer)))),
        }
    }

    /// Write one command; concurrent senders never interleave frames.
    pub fn send(&self, command: &Command) -> Result<(), ChannelError> {
        let frame = command.encode()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_frame(&frame).inspect_err(|e| {
            log::error!("command channel: could not send command {}: {}", command.tag(), e);
        })
    }
}

/// Receiving half of the command channel.
pub struct CommandReceiver {
    reader: FrameReader<Box<dyn Read + Send>>,
    frame: Vec<u8>,
}

impl CommandReceiver {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: FrameReader::new(Box::new(reader)),
            frame: Vec::with_capacity(MAX_COMMAND_LEN),
        }
    }

    /// Block until one complete command has arrived.
    pub fn recv(&mut self) -> Result<Command, ChannelError> {
        let mut tag = [0u8; 1];
        self.reader.fill(&mut tag, true)?;
        let len = Command::payload_len(tag[0]).ok_or(ChannelError::UnknownDiscriminant(tag[0]))?;

        self.frame.clear();
        self.frame.resize(len + 1, 0);
        self.frame[0] = tag[0];
        self.reader.fill(&mut self.frame[1..], false)?;
        Command::decode(&self.frame)
    }
}

/// Sending half of the status channel (engine thread only).
pub struct StatusSender {
    writer: FrameWriter<Box<dyn Write + Send>>,
}

impl StatusSender {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self { writer: FrameWriter::new(Box::new(writer)) }
    }

    /// Write one status message.
    pub fn send(&mut self, status: &Status) -> Result<(), ChannelError> {
        let frame = status.encode()?;
        self.writer.write_frame(&frame).inspect_err(|e| {
            log::error!("status channel: could not send status {}: {}", status.tag(), e);
        })
    }
}

/// Receiving half of the status channel.
pub struct StatusReceiver {
    reader: FrameReader<Box<dyn Read + Send>>,
    frame: Vec<u8>,
}

impl StatusReceiver {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self { reader: FrameReader::new(Box::new(reader)), frame: Vec::new() }
    }

    /// Block until one complete status has arrived.
    pub fn recv(&mut self) -> Result<Status, ChannelError> {
        let mut tag = [0u8; 1];
        self.reader.fill(&mut tag, true)?;
        let shape = Shape::of(tag[0]).ok_or(ChannelError::UnknownDiscriminant(tag[0]))?;

        // Header first: it carries the text length.
        let header_end = 1 + shape.header_len();
        self.frame.clear();
        self.frame.resize(header_end, 0);
        self.frame[0] = tag[0];
        self.reader.fill(&mut self.frame[1..header_end], false)?;

        let text_len = shape.declared_len(&self.frame[1..header_end])?;
        self.frame.resize(header_end + text_len, 0);
        self.reader.fill(&mut self.frame[header_end..], false)?;
        Status::decode(&self.frame)
    }
}

/// Create a command channel over an in-process pipe.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (w, r) = pipe(PIPE_CAPACITY);
    (CommandSender::new(w), CommandReceiver::new(r))
}

/// Create a status channel over an in-process pipe.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (w, r) = pipe(PIPE_CAPACITY);
    (StatusSender::new(w), StatusReceiver::new(r))
}
