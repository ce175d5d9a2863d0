//! Conversion from the mixer's native PCM layout to the device's layout.
//!
//! The plan is computed once per (native, target) pair. Applying it runs
//! the steps in a fixed order: depth, channels, sign, then byte packing in
//! the target's byte order.

use tx_proto::MixFormat;

use crate::error::FormatError;

/// Which transformations turn `native` into `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionPlan {
    pub native: MixFormat,
    pub target: MixFormat,
    narrow: bool,
    widen: bool,
    downmix: bool,
    upmix: bool,
    flip_sign: bool,
    swap_bytes: bool,
}

fn validate(format: &MixFormat) -> Result<(), FormatError> {
    if format.bits != 8 && format.bits != 16 {
        return Err(FormatError::UnsupportedDepth(format.bits));
    }
    if format.channels != 1 && format.channels != 2 {
        return Err(FormatError::UnsupportedChannels(format.channels));
    }
    Ok(())
}

impl ConversionPlan {
    pub fn new(native: MixFormat, target: MixFormat) -> Result<Self, FormatError> {
        validate(&native)?;
        validate(&target)?;
        Ok(Self {
            native,
            target,
            narrow: native.bits == 16 && target.bits == 8,
            widen: native.bits == 8 && target.bits == 16,
            downmix: native.channels == 2 && target.channels == 1,
            upmix: native.channels == 1 && target.channels == 2,
            flip_sign: native.signed != target.signed,
            // Only meaningful once the data is 16-bit.
            swap_bytes: target.bits == 16 && native.big_endian != target.big_endian,
        })
    }

    /// True if native data can be handed over unchanged.
    pub fn is_identity(&self) -> bool {
        !(self.narrow || self.widen || self.downmix || self.upmix || self.flip_sign || self.swap_bytes)
    }

    /// Output bytes for `frames` native frames.
    pub fn output_len(&self, frames: usize) -> usize {
        frames * self.target.frame_bytes()
    }

    /// Convert native sample words and append the packed result to `out`.
    ///
    /// `words` holds one native sample per element as a raw bit pattern: a
    /// full 16-bit word, or the low byte for 8-bit native data. It is used
    /// as scratch and left in an unspecified state.
    pub fn apply(&self, words: &mut Vec<u16>, out: &mut Vec<u8>) {
        let mut bits = self.native.bits;

        if self.narrow {
            words.iter_mut().for_each(|w| *w >>= 8);
            bits = 8;
        } else if self.widen {
            words.iter_mut().for_each(|w| *w <<= 8);
            bits = 16;
        }

        if self.downmix {
            let signed = self.native.signed;
            let frames = words.len() / 2;
            for i in 0..frames {
                words[i] = average(words[2 * i], words[2 * i + 1], bits, signed);
            }
            words.truncate(frames);
        } else if self.upmix {
            let frames = words.len();
            words.resize(frames * 2, 0);
            for i in (0..frames).rev() {
                let w = words[i];
                words[2 * i] = w;
                words[2 * i + 1] = w;
            }
        }

        if self.flip_sign {
            // Adding half the range modulo 2^bits toggles the top bit.
            let half = if bits == 16 { 0x8000 } else { 0x80 };
            words.iter_mut().for_each(|w| *w ^= half);
        }

        out.reserve(words.len() * (bits as usize / 8));
        if bits == 8 {
            out.extend(words.iter().map(|&w| w as u8));
        } else {
            for &w in words.iter() {
                let mut bytes = if self.native.big_endian { w.to_be_bytes() } else { w.to_le_bytes() };
                if self.swap_bytes {
                    bytes.swap(0, 1);
                }
                out.extend_from_slice(&bytes);
            }
        }
    }
}

fn average(a: u16, b: u16, bits: u8, signed: bool) -> u16 {
    let mask: u16 = if bits == 16 { 0xffff } else { 0x00ff };
    let value = |w: u16| -> i32 {
        if !signed {
            w as i32
        } else if bits == 16 {
            w as i16 as i32
        } else {
            w as u8 as i8 as i32
        }
    };
    (((value(a) + value(b)) / 2) as u16) & mask
}
