//! Status messages (engine → control).
//!
//! Three wire shapes share one discriminant space:
//!
//! - bare: `[tag]`
//! - text: `[tag][len: u16][len bytes of UTF-8]`
//! - errno: `[tag][code: i32][len: u16][len bytes of UTF-8]`

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};

use crate::error::ChannelError;

/// Longest text a status message can carry.
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

const TAG_DRIVER_OPEN_FAILED: u8 = 0;
const TAG_PLAYING_STARTED: u8 = 1;
const TAG_PLAYING_PATTERN_STARTED: u8 = 2;
const TAG_PLAYING_NOTE_STARTED: u8 = 3;
const TAG_PLAYING_STOPPED: u8 = 4;
const TAG_ERROR: u8 = 5;
const TAG_WARNING: u8 = 6;
const TAG_ERRNO: u8 = 7;

/// An event reported by the engine thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    DriverOpenFailed,
    PlayingStarted,
    PlayingPatternStarted,
    PlayingNoteStarted,
    PlayingStopped,
    Error(String),
    Warning(String),
    Errno { code: i32, text: String },
}

#[derive(BinRead, BinWrite)]
#[brw(little)]
struct TextHeader {
    len: u16,
}

#[derive(BinRead, BinWrite)]
#[brw(little)]
struct ErrnoHeader {
    code: i32,
    len: u16,
}

/// Shape of a status message, known from its discriminant alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Shape {
    Bare,
    Text,
    Errno,
}

impl Shape {
    pub(crate) fn of(tag: u8) -> Option<Self> {
        match tag {
            TAG_DRIVER_OPEN_FAILED..=TAG_PLAYING_STOPPED => Some(Shape::Bare),
            TAG_ERROR | TAG_WARNING => Some(Shape::Text),
            TAG_ERRNO => Some(Shape::Errno),
            _ => None,
        }
    }

    /// Bytes after the discriminant that must be read before the text length is known.
    pub(crate) const fn header_len(self) -> usize {
        match self {
            Shape::Bare => 0,
            Shape::Text => 2,
            Shape::Errno => 6,
        }
    }

    /// Text length declared by a header of this shape.
    pub(crate) fn declared_len(self, header: &[u8]) -> Result<usize, ChannelError> {
        let mut cursor = Cursor::new(header);
        Ok(match self {
            Shape::Bare => 0,
            Shape::Text => TextHeader::read_le(&mut cursor)?.len as usize,
            Shape::Errno => ErrnoHeader::read_le(&mut cursor)?.len as usize,
        })
    }
}

impl Status {
    /// Wire discriminant of this message.
    pub fn tag(&self) -> u8 {
        match self {
            Status::DriverOpenFailed => TAG_DRIVER_OPEN_FAILED,
            Status::PlayingStarted => TAG_PLAYING_STARTED,
            Status::PlayingPatternStarted => TAG_PLAYING_PATTERN_STARTED,
            Status::PlayingNoteStarted => TAG_PLAYING_NOTE_STARTED,
            Status::PlayingStopped => TAG_PLAYING_STOPPED,
            Status::Error(_) => TAG_ERROR,
            Status::Warning(_) => TAG_WARNING,
            Status::Errno { .. } => TAG_ERRNO,
        }
    }

    /// True for the statuses a control thread treats as "request not honored".
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Status::DriverOpenFailed | Status::Error(_) | Status::Errno { .. }
        )
    }

    /// Encode into a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let mut cursor = Cursor::new(Vec::new());
        cursor.get_mut().push(self.tag());
        cursor.set_position(1);

        match self {
            Status::Error(text) | Status::Warning(text) => {
                TextHeader { len: text_len(text)? }.write_le(&mut cursor)?;
                cursor.get_mut().extend_from_slice(text.as_bytes());
            }
            Status::Errno { code, text } => {
                ErrnoHeader { code: *code, len: text_len(text)? }.write_le(&mut cursor)?;
                cursor.get_mut().extend_from_slice(text.as_bytes());
            }
            _ => {}
        }
        Ok(cursor.into_inner())
    }

    /// Decode a complete frame, rejecting any length mismatch.
    pub fn decode(frame: &[u8]) -> Result<Self, ChannelError> {
        let tag = *frame
            .first()
            .ok_or_else(|| ChannelError::Malformed("empty status frame".into()))?;
        let shape = Shape::of(tag).ok_or(ChannelError::UnknownDiscriminant(tag))?;

        let header_end = 1 + shape.header_len();
        if frame.len() < header_end {
            return Err(ChannelError::Malformed(format!(
                "status {} frame shorter than its header",
                tag
            )));
        }
        let declared = shape.declared_len(&frame[1..header_end])?;
        let body = &frame[header_end..];
        if body.len() != declared {
            return Err(ChannelError::Malformed(format!(
                "status {} declares {} text bytes, frame has {}",
                tag,
                declared,
                body.len()
            )));
        }

        Ok(match tag {
            TAG_DRIVER_OPEN_FAILED => Status::DriverOpenFailed,
            TAG_PLAYING_STARTED => Status::PlayingStarted,
            TAG_PLAYING_PATTERN_STARTED => Status::PlayingPatternStarted,
            TAG_PLAYING_NOTE_STARTED => Status::PlayingNoteStarted,
            TAG_PLAYING_STOPPED => Status::PlayingStopped,
            TAG_ERROR => Status::Error(decode_text(body)?),
            TAG_WARNING => Status::Warning(decode_text(body)?),
            _ => {
                let header = ErrnoHeader::read_le(&mut Cursor::new(&frame[1..header_end]))?;
                Status::Errno { code: header.code, text: decode_text(body)? }
            }
        })
    }
}

fn text_len(text: &str) -> Result<u16, ChannelError> {
    u16::try_from(text.len()).map_err(|_| ChannelError::TextTooLong(text.len()))
}

fn decode_text(body: &[u8]) -> Result<String, ChannelError> {
    String::from_utf8(body.to_vec())
        .map_err(|e| ChannelError::Malformed(format!("status text is not UTF-8: {}", e)))
}
