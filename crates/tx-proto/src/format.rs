//! Sample format descriptor shared by devices, the engine and the wire.

use binrw::{BinRead, BinWrite};

/// Layout of the PCM data a device wants the engine to produce.
#[derive(BinRead, BinWrite, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[brw(little)]
pub struct MixFormat {
    /// Bits per sample (8 or 16).
    pub bits: u8,
    #[br(map = |b: u8| b != 0)]
    #[bw(map = |b: &bool| u8::from(*b))]
    pub signed: bool,
    #[br(map = |b: u8| b != 0)]
    #[bw(map = |b: &bool| u8::from(*b))]
    pub big_endian: bool,
    /// Interleaved channels per frame (1 or 2).
    pub channels: u8,
}

impl MixFormat {
    /// Encoded size on the wire.
    pub const WIRE_LEN: usize = 4;

    /// 16-bit signed stereo in the host's byte order.
    pub const fn native_s16_stereo() -> Self {
        Self {
            bits: 16,
            signed: true,
            big_endian: cfg!(target_endian = "big"),
            channels: 2,
        }
    }

    /// Bytes occupied by one interleaved frame.
    pub const fn frame_bytes(&self) -> usize {
        (self.bits as usize / 8) * self.channels as usize
    }

    /// True for two interleaved channels.
    pub const fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

impl Default for MixFormat {
    fn default() -> Self {
        Self::native_s16_stereo()
    }
}
