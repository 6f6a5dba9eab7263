//! Waveform preview peaks
//!
//! Fixed-size max-amplitude summary for display. Each bucket covers an
//! equal share of the buffer and holds the largest absolute sample found
//! in any channel.

use crate::pipeline::PcmBuffer;

/// Peak per bucket, `buckets` values in `0.0..=1.0`
pub fn waveform_peaks(buffer: &PcmBuffer, buckets: usize) -> Vec<f32> {
    let frames = buffer.frames();
    if buckets == 0 {
        return Vec::new();
    }
    if frames == 0 {
        return vec![0.0; buckets];
    }

    (0..buckets)
        .map(|b| {
            let start = b * frames / buckets;
            let end = ((b + 1) * frames / buckets).max(start + 1).min(frames);
            if start >= frames {
                return 0.0;
            }
            buffer
                .channels
                .iter()
                .flat_map(|c| c[start..end].iter())
                .fold(0.0f64, |peak, s| peak.max(s.abs()))
                .min(1.0) as f32
        })
        .collect()
}
