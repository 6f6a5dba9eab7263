//! PCM WAV container encoding
//!
//! Writes the canonical 44-byte RIFF/WAVE header (format tag 1, no
//! extensible chunk) followed by interleaved little-endian integer samples.

use wf_core::BitDepth;

use crate::cancel::CancelToken;
use crate::error::{OfflineError, OfflineResult};
use crate::pipeline::PcmBuffer;

/// Size of the canonical PCM header
pub const WAV_HEADER_LEN: usize = 44;

// ═══════════════════════════════════════════════════════════════════════════════
// ENCODER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Audio encoder trait
pub trait AudioEncoder {
    /// Encode a rendered buffer to container bytes.
    ///
    /// `progress` receives the completed fraction in `0.0..=1.0`.
    fn encode(
        &self,
        buffer: &PcmBuffer,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(f64),
    ) -> OfflineResult<Vec<u8>>;

    /// Get file extension
    fn extension(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV ENCODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte-exact PCM WAV writer (16 or 24 bit)
#[derive(Debug, Clone, Copy)]
pub struct WavEncoder {
    bit_depth: BitDepth,
    cancel_stride: usize,
}

impl WavEncoder {
    pub fn new(bit_depth: BitDepth) -> Self {
        Self {
            bit_depth,
            cancel_stride: 100_000,
        }
    }

    /// Samples written between cancellation checks
    pub fn with_cancel_stride(mut self, samples: usize) -> Self {
        self.cancel_stride = samples.max(1);
        self
    }

    /// Write the 44-byte header for a `data_len`-byte payload
    fn write_header(&self, out: &mut Vec<u8>, channels: u16, sample_rate: u32, data_len: u32) {
        let bytes_per_sample = self.bit_depth.bytes_per_sample() as u16;
        let block_align = channels * bytes_per_sample;
        let byte_rate = sample_rate * block_align as u32;

        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&self.bit_depth.bits().to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
    }
}

impl AudioEncoder for WavEncoder {
    fn encode(
        &self,
        buffer: &PcmBuffer,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(f64),
    ) -> OfflineResult<Vec<u8>> {
        let frames = buffer.frames();
        let channel_count = buffer.channel_count();
        if frames == 0 || channel_count == 0 {
            return Err(OfflineError::Encode("Nothing to encode".to_string()));
        }

        let channels = u16::try_from(channel_count)
            .map_err(|_| OfflineError::Encode(format!("Too many channels: {}", channel_count)))?;
        let bytes_per_sample = self.bit_depth.bytes_per_sample();
        let total_samples = frames * channel_count;

        let data_len = total_samples
            .checked_mul(bytes_per_sample)
            .and_then(|len| u32::try_from(len).ok())
            .filter(|len| *len <= u32::MAX - 36)
            .ok_or_else(|| {
                OfflineError::Encode(format!(
                    "{} frames exceed the 4 GiB WAV limit",
                    frames
                ))
            })?;

        let mut out = Vec::new();
        out.try_reserve_exact(WAV_HEADER_LEN + data_len as usize)
            .map_err(|e| OfflineError::Encode(format!("Output allocation failed: {}", e)))?;

        self.write_header(&mut out, channels, buffer.sample_rate, data_len);

        let mut written = 0usize;
        for frame in 0..frames {
            for channel in &buffer.channels {
                let sample = channel[frame];
                match self.bit_depth {
                    BitDepth::Sixteen => out.extend_from_slice(&pcm16(sample).to_le_bytes()),
                    BitDepth::TwentyFour => out.extend_from_slice(&pcm24(sample)),
                }

                written += 1;
                if written % self.cancel_stride == 0 {
                    cancel.check()?;
                    progress(written as f64 / total_samples as f64);
                }
            }
        }

        progress(1.0);
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "wav"
    }
}

/// Clamp and scale asymmetrically, truncating toward zero
#[inline]
pub fn pcm16(sample: f64) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Clamp and scale to 24 bits, returned as 3 little-endian bytes
#[inline]
pub fn pcm24(sample: f64) -> [u8; 3] {
    let s = sample.clamp(-1.0, 1.0);
    let value = if s < 0.0 {
        (s * 8_388_608.0) as i32
    } else {
        (s * 8_388_607.0) as i32
    };
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_progress() -> impl FnMut(f64) {
        |_| {}
    }

    #[test]
    fn test_pcm16_scaling() {
        assert_eq!(pcm16(1.0), 32767);
        assert_eq!(pcm16(-1.0), -32768);
        assert_eq!(pcm16(0.0), 0);
        assert_eq!(pcm16(2.5), 32767);
        assert_eq!(pcm16(-7.0), -32768);
        // Truncation, not rounding
        assert_eq!(pcm16(0.99999), 32766);
        assert_eq!(pcm16(-0.5), -16384);
    }

    #[test]
    fn test_pcm24_packing() {
        assert_eq!(pcm24(1.0), [0xFF, 0xFF, 0x7F]);
        assert_eq!(pcm24(-1.0), [0x00, 0x00, 0x80]);
        assert_eq!(pcm24(0.0), [0x00, 0x00, 0x00]);
        assert_eq!(pcm24(-0.5), [0x00, 0x00, 0xC0]);
    }

    #[test]
    fn test_header_16bit_stereo() {
        let buffer = PcmBuffer::from_channels(vec![vec![0.0; 10], vec![0.0; 10]], 44100);
        let bytes = WavEncoder::new(BitDepth::Sixteen)
            .encode(&buffer, &CancelToken::new(), &mut no_progress())
            .unwrap();

        assert_eq!(bytes.len(), 44 + 10 * 2 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 76);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 44100);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 176_400);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 4);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 40);
    }

    #[test]
    fn test_interleaved_frame_major() {
        let buffer = PcmBuffer::from_channels(vec![vec![1.0, 0.0], vec![-1.0, 0.5]], 48000);
        let bytes = WavEncoder::new(BitDepth::Sixteen)
            .encode(&buffer, &CancelToken::new(), &mut no_progress())
            .unwrap();

        let samples: Vec<i16> = bytes[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn test_24bit_layout() {
        let buffer = PcmBuffer::from_channels(vec![vec![1.0, -1.0]], 48000);
        let bytes = WavEncoder::new(BitDepth::TwentyFour)
            .encode(&buffer, &CancelToken::new(), &mut no_progress())
            .unwrap();

        assert_eq!(bytes.len(), 44 + 6);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 3);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 24);
        assert_eq!(&bytes[44..], &[0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let buffer = PcmBuffer::from_channels(vec![Vec::new()], 48000);
        let result =
            WavEncoder::new(BitDepth::Sixteen).encode(&buffer, &CancelToken::new(), &mut no_progress());
        assert!(matches!(result, Err(OfflineError::Encode(_))));
    }

    #[test]
    fn test_stride_cancel_and_progress() {
        let buffer = PcmBuffer::from_channels(vec![vec![0.1; 1000]], 8000);
        let encoder = WavEncoder::new(BitDepth::Sixteen).with_cancel_stride(100);

        let mut seen = Vec::new();
        encoder
            .encode(&buffer, &CancelToken::new(), &mut |p| seen.push(p))
            .unwrap();
        assert_eq!(seen.len(), 11);
        assert!((seen[0] - 0.1).abs() < 1e-12);
        assert_eq!(seen.last().copied(), Some(1.0));

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = encoder.encode(&buffer, &cancel, &mut no_progress());
        assert!(matches!(result, Err(OfflineError::Cancelled)));
    }
}
