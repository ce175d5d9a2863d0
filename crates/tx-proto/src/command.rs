//! Command messages (control → engine).

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};

use crate::error::ChannelError;
use crate::format::MixFormat;

/// Largest encoded command, discriminant included.
pub const MAX_COMMAND_LEN: usize = 21;

/// A request for the engine thread.
///
/// Every variant has a fixed payload size determined by its discriminant,
/// see [`Command::payload_len`].
#[derive(BinRead, BinWrite, Clone, Debug, PartialEq)]
#[brw(little)]
pub enum Command {
    #[brw(magic = 0u8)]
    InitPlayer,

    #[brw(magic = 1u8)]
    PlaySong {
        songpos: u32,
        patpos: u32,
        #[br(map = |b: u8| b != 0)]
        #[bw(map = |b: &bool| u8::from(*b))]
        looped: bool,
    },

    #[brw(magic = 2u8)]
    PlayPattern {
        pattern: u32,
        patpos: u32,
        #[br(map = |b: u8| b != 0)]
        #[bw(map = |b: &bool| u8::from(*b))]
        single_row: bool,
        #[br(map = |b: u8| b != 0)]
        #[bw(map = |b: &bool| u8::from(*b))]
        looped: bool,
        /// Row to stop at, or -1 to play to the end of the pattern.
        stop_pos: i32,
        first_channel: u16,
        channels: u16,
    },

    #[brw(magic = 3u8)]
    PlayNote {
        channel: u16,
        note: u8,
        instrument: u16,
        #[br(map = |b: u8| b != 0)]
        #[bw(map = |b: &bool| u8::from(*b))]
        all_channels: bool,
    },

    #[brw(magic = 4u8)]
    PlayNoteFull {
        channel: u16,
        note: u8,
        /// Handle into the sequencer's sample bank.
        sample: u32,
        offset: u32,
        /// Frame to stop playing at (0 = sample end).
        end: u32,
        #[br(map = |b: u8| b != 0)]
        #[bw(map = |b: &bool| u8::from(*b))]
        all_channels: bool,
        instrument: u16,
        sample_index: u16,
    },

    #[brw(magic = 5u8)]
    PlayNoteKeyoff { channel: u16 },

    #[brw(magic = 6u8)]
    StopNote { channel: u16 },

    #[brw(magic = 7u8)]
    StopPlaying,

    #[brw(magic = 8u8)]
    SetSongPosition { songpos: u32 },

    #[brw(magic = 9u8)]
    SetPattern { pattern: u32 },

    #[brw(magic = 10u8)]
    SetAmplification { gain: f32 },

    #[brw(magic = 11u8)]
    SetPitchbend { percent: f32 },

    #[brw(magic = 12u8)]
    SetMixer { index: u32 },

    #[brw(magic = 13u8)]
    SetTempo { tempo: i32 },

    #[brw(magic = 14u8)]
    SetBpm { bpm: i32 },

    /// The active device has room for `count` frames.
    #[brw(magic = 15u8)]
    DataRequested {
        /// Device session the request belongs to.
        epoch: u32,
        count: u32,
        rate: u32,
        format: MixFormat,
    },

    #[brw(magic = 16u8)]
    Quit,
}

impl Command {
    /// Payload size for a discriminant, or `None` if it is not a command.
    pub const fn payload_len(tag: u8) -> Option<usize> {
        Some(match tag {
            0 | 7 | 16 => 0,
            1 => 9,
            2 => 18,
            3 => 6,
            4 => 20,
            5 | 6 => 2,
            8..=14 => 4,
            15 => 12 + MixFormat::WIRE_LEN,
            _ => return None,
        })
    }

    /// The discriminant byte this command is framed with.
    pub fn tag(&self) -> u8 {
        match self {
            Command::InitPlayer => 0,
            Command::PlaySong { .. } => 1,
            Command::PlayPattern { .. } => 2,
            Command::PlayNote { .. } => 3,
            Command::PlayNoteFull { .. } => 4,
            Command::PlayNoteKeyoff { .. } => 5,
            Command::StopNote { .. } => 6,
            Command::StopPlaying => 7,
            Command::SetSongPosition { .. } => 8,
            Command::SetPattern { .. } => 9,
            Command::SetAmplification { .. } => 10,
            Command::SetPitchbend { .. } => 11,
            Command::SetMixer { .. } => 12,
            Command::SetTempo { .. } => 13,
            Command::SetBpm { .. } => 14,
            Command::DataRequested { .. } => 15,
            Command::Quit => 16,
        }
    }

    /// Encode into a complete frame (discriminant + payload).
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let mut cursor = Cursor::new(Vec::with_capacity(MAX_COMMAND_LEN));
        self.write_le(&mut cursor)?;
        let bytes = cursor.into_inner();

        let expected = Self::payload_len(self.tag()).map(|len| len + 1);
        if expected != Some(bytes.len()) {
            return Err(ChannelError::Malformed(format!(
                "command {} encoded to {} bytes",
                self.tag(),
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Decode a complete frame. The frame must be exactly one command.
    pub fn decode(frame: &[u8]) -> Result<Self, ChannelError> {
        let tag = *frame
            .first()
            .ok_or_else(|| ChannelError::Malformed("empty command frame".into()))?;
        let len = Self::payload_len(tag).ok_or(ChannelError::UnknownDiscriminant(tag))?;
        if frame.len() != len + 1 {
            return Err(ChannelError::Malformed(format!(
                "command {} declares {} payload bytes, frame has {}",
                tag,
                len,
                frame.len() - 1
            )));
        }

        let mut cursor = Cursor::new(frame);
        let command = Self::read_le(&mut cursor)?;
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_command() -> Vec<Command> {
        vec![
            Command::InitPlayer,
            Command::PlaySong { songpos: 3, patpos: 17, looped: true },
            Command::PlayPattern {
                pattern: 12,
                patpos: 4,
                single_row: false,
                looped: true,
                stop_pos: -1,
                first_channel: 2,
                channels: 6,
            },
            Command::PlayNote { channel: 7, note: 60, instrument: 3, all_channels: false },
            Command::PlayNoteFull {
                channel: 1,
                note: 48,
                sample: 0xdead_beef,
                offset: 1024,
                end: 88200,
                all_channels: true,
                instrument: 9,
                sample_index: 2,
            },
            Command::PlayNoteKeyoff { channel: 31 },
            Command::StopNote { channel: 0 },
            Command::StopPlaying,
            Command::SetSongPosition { songpos: 255 },
            Command::SetPattern { pattern: 77 },
            Command::SetAmplification { gain: 1.75 },
            Command::SetPitchbend { percent: -12.5 },
            Command::SetMixer { index: 1 },
            Command::SetTempo { tempo: 6 },
            Command::SetBpm { bpm: 140 },
            Command::DataRequested {
                epoch: 4,
                count: 1024,
                rate: 48000,
                format: MixFormat { bits: 8, signed: false, big_endian: true, channels: 1 },
            },
            Command::Quit,
        ]
    }

    #[test]
    fn every_command_round_trips() {
        for cmd in every_command() {
            let frame = cmd.encode().unwrap();
            assert_eq!(frame[0], cmd.tag());
            assert_eq!(Command::decode(&frame).unwrap(), cmd);
        }
    }

    #[test]
    fn encoded_length_matches_payload_table() {
        for cmd in every_command() {
            let frame = cmd.encode().unwrap();
            assert_eq!(frame.len(), Command::payload_len(cmd.tag()).unwrap() + 1);
            assert!(frame.len() <= MAX_COMMAND_LEN);
        }
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        assert!(Command::payload_len(0x7f).is_none());
        assert!(matches!(
            Command::decode(&[0x7f]),
            Err(ChannelError::UnknownDiscriminant(0x7f))
        ));
    }

    #[test]
    fn short_and_long_frames_are_malformed() {
        let frame = Command::SetBpm { bpm: 125 }.encode().unwrap();
        assert!(matches!(
            Command::decode(&frame[..frame.len() - 1]),
            Err(ChannelError::Malformed(_))
        ));

        let mut long = frame.clone();
        long.push(0);
        assert!(matches!(Command::decode(&long), Err(ChannelError::Malformed(_))));
    }

    #[test]
    fn payload_is_little_endian() {
        let frame = Command::SetSongPosition { songpos: 0x0102_0304 }.encode().unwrap();
        assert_eq!(frame, vec![8, 0x04, 0x03, 0x02, 0x01]);
    }
}
