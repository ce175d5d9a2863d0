//! Accumulator to 16-bit PCM, with clipping detection.

use crate::mixer::AccumBuffer;

/// Integer-domain gain in 1/256 units for a given channel count.
///
/// More channels leave less headroom per channel, so the gain drops in steps.
pub fn integer_headroom(channels: usize) -> i32 {
    match channels {
        0..=2 => 256,
        3..=4 => 192,
        5..=8 => 128,
        9..=16 => 96,
        _ => 64,
    }
}

/// Convert `accum` into clamped 16-bit samples appended to `out`.
///
/// Integer accumulators are scaled by `integer_headroom(channels)`; float
/// accumulators by `amplification * 32767`. Returns true if any sample hit
/// the 16-bit limits.
pub fn amplify(accum: &AccumBuffer, channels: usize, amplification: f32, out: &mut Vec<i16>) -> bool {
    let mut clipped = false;
    let mut clamp = |v: i64| -> i16 {
        if v > i16::MAX as i64 {
            clipped = true;
            i16::MAX
        } else if v < i16::MIN as i64 {
            clipped = true;
            i16::MIN
        } else {
            v as i16
        }
    };

    match accum {
        AccumBuffer::Integer(buf) => {
            let gain = integer_headroom(channels) as i64;
            out.extend(buf.iter().map(|&acc| clamp((acc as i64 * gain) >> 16)));
        }
        AccumBuffer::Float(buf) => {
            let gain = amplification * 32767.0;
            out.extend(buf.iter().map(|&acc| clamp((acc * gain) as i64)));
        }
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headroom_steps_down_with_channel_count() {
        assert_eq!(integer_headroom(1), 256);
        assert_eq!(integer_headroom(4), 192);
        assert_eq!(integer_headroom(8), 128);
        assert_eq!(integer_headroom(16), 96);
        assert_eq!(integer_headroom(32), 64);
    }

    #[test]
    fn full_volume_sample_passes_through_on_two_channels() {
        // Sample value at volume 256.
        let accum = AccumBuffer::Integer(vec![1000 * 256, -1000 * 256]);
        let mut out = Vec::new();
        assert!(!amplify(&accum, 2, 1.0, &mut out));
        assert_eq!(out, vec![1000, -1000]);
    }

    #[test]
    fn integer_overflow_clips_and_flags() {
        let accum = AccumBuffer::Integer(vec![40_000 * 256, -40_000 * 256, 0]);
        let mut out = Vec::new();
        assert!(amplify(&accum, 1, 1.0, &mut out));
        assert_eq!(out, vec![i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn float_domain_scales_by_amplification() {
        let accum = AccumBuffer::Float(vec![0.5, -0.25]);
        let mut out = Vec::new();
        assert!(!amplify(&accum, 8, 1.0, &mut out));
        assert_eq!(out, vec![16383, -8191]);

        out.clear();
        assert!(amplify(&accum, 8, 4.0, &mut out));
        assert_eq!(out, vec![i16::MAX, -32767]);
    }
}
