//! WAV encoding for interleaved 16-bit PCM.

use std::io::{self, Write};

use binrw::io::Cursor;
use binrw::BinWrite;

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: u32 = 44;

/// The canonical PCM header: RIFF, `fmt ` and `data` chunk headers.
#[derive(BinWrite)]
#[bw(little, magic = b"RIFF")]
struct WavHeader {
    riff_len: u32,
    format: FormatChunk,
    data: DataChunkHeader,
}

#[derive(BinWrite)]
#[bw(little, magic = b"WAVEfmt ")]
struct FormatChunk {
    chunk_len: u32,
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

#[derive(BinWrite)]
#[bw(little, magic = b"data")]
struct DataChunkHeader {
    len: u32,
}

impl WavHeader {
    fn pcm16(channels: u16, sample_rate: u32, data_len: u32) -> Self {
        let block_align = channels * BITS_PER_SAMPLE / 8;
        Self {
            riff_len: HEADER_LEN - 8 + data_len,
            format: FormatChunk {
                chunk_len: 16,
                format_tag: 1,
                channels,
                sample_rate,
                byte_rate: sample_rate * block_align as u32,
                block_align,
                bits_per_sample: BITS_PER_SAMPLE,
            },
            data: DataChunkHeader { len: data_len },
        }
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN as usize));
        self.write_le(&mut cursor).map_err(|e| io::Error::other(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Write `samples` (interleaved, `channels` per frame) as a WAV stream.
///
/// Fails if the writer does, or if the data does not fit the 32-bit RIFF
/// size fields.
pub fn write_wav(w: &mut impl Write, samples: &[i16], channels: u16, sample_rate: u32) -> io::Result<()> {
    let data_len = u32::try_from(samples.len() * 2)
        .ok()
        .filter(|&n| n <= u32::MAX - HEADER_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "too much audio for one WAV file"))?;

    w.write_all(&WavHeader::pcm16(channels, sample_rate, data_len).encode()?)?;
    let mut block = Vec::with_capacity(8192);
    for chunk in samples.chunks(4096) {
        block.clear();
        block.extend(chunk.iter().flat_map(|s| s.to_le_bytes()));
        w.write_all(&block)?;
    }
    Ok(())
}

/// Encode interleaved stereo samples as a complete in-memory WAV file.
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN as usize + samples.len() * 2);
    write_wav(&mut buf, samples, 2, sample_rate)?;
    Ok(buf)
}
