//! Sample rate and channel conversion
//!
//! Rendering is remix first, then rate conversion:
//! - to mono: equal-weight average of every source channel
//! - mono to stereo: duplication
//! - more than two channels to stereo: the first two channels
//!
//! Two resamplers are provided. [`LinearResampler`] interpolates between
//! neighbouring frames and is cheap; [`SincResampler`] runs a windowed-sinc
//! filter through rubato. Both always emit exactly
//! [`expected_output_frames`] frames.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::cancel::CancelToken;
use crate::config::SrcQuality;
use crate::error::{OfflineError, OfflineResult};
use crate::pipeline::PcmBuffer;

/// Frames fed to the sinc filter per call
const SINC_CHUNK_FRAMES: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST
// ═══════════════════════════════════════════════════════════════════════════════

/// A slice of a decoded buffer and the format to render it into
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub source: &'a PcmBuffer,
    pub start_frame: usize,
    pub frame_count: usize,
    pub target_rate: u32,
    pub target_channels: usize,
}

impl<'a> RenderRequest<'a> {
    pub fn new(
        source: &'a PcmBuffer,
        start_frame: usize,
        frame_count: usize,
        target_rate: u32,
        target_channels: usize,
    ) -> Self {
        Self {
            source,
            start_frame,
            frame_count,
            target_rate,
            target_channels,
        }
    }

    /// Frame count the rendered buffer must have
    pub fn expected_frames(&self) -> usize {
        expected_output_frames(self.frame_count, self.source.sample_rate, self.target_rate)
    }

    fn validate(&self) -> OfflineResult<()> {
        if self.frame_count == 0 {
            return Err(OfflineError::Render("Nothing to render".to_string()));
        }
        if self.start_frame + self.frame_count > self.source.frames() {
            return Err(OfflineError::Render(format!(
                "Slice {}..{} is outside a buffer of {} frames",
                self.start_frame,
                self.start_frame + self.frame_count,
                self.source.frames()
            )));
        }
        if self.source.sample_rate == 0 || self.target_rate == 0 {
            return Err(OfflineError::Render("Sample rate must be non-zero".to_string()));
        }
        if self.target_channels == 0 || self.source.channel_count() == 0 {
            return Err(OfflineError::Render("Channel count must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// `max(1, round(frames * dst / src))`
pub fn expected_output_frames(frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 1;
    }
    let exact = frames as f64 * dst_rate as f64 / src_rate as f64;
    (exact.round() as usize).max(1)
}

/// Copy the requested slice into `target_channels` planar channels
pub fn remix(source: &PcmBuffer, start: usize, count: usize, target_channels: usize) -> Vec<Vec<f64>> {
    let end = start + count;
    let planes: Vec<&[f64]> = source.channels.iter().map(|c| &c[start..end]).collect();

    match (planes.len(), target_channels) {
        (_, 1) => {
            let weight = 1.0 / planes.len() as f64;
            let mixed = (0..count)
                .map(|i| planes.iter().map(|p| p[i]).sum::<f64>() * weight)
                .collect();
            vec![mixed]
        }
        (1, n) => vec![planes[0].to_vec(); n],
        (_, n) => (0..n)
            .map(|ch| planes.get(ch).copied().unwrap_or(planes[0]).to_vec())
            .collect(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESAMPLER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders a slice into a new buffer at the target rate and channel count.
///
/// Implementations must be deterministic for fixed input and must return
/// exactly [`RenderRequest::expected_frames`] frames per channel.
pub trait Resampler: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, request: RenderRequest<'_>, cancel: &CancelToken) -> OfflineResult<PcmBuffer>;
}

/// Resampler for a configured quality
pub fn resampler_for_quality(quality: SrcQuality) -> Box<dyn Resampler> {
    match quality {
        SrcQuality::Quick => Box::new(LinearResampler),
        SrcQuality::Medium => Box::new(SincResampler::medium()),
        SrcQuality::Best => Box::new(SincResampler::best()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINEAR
// ═══════════════════════════════════════════════════════════════════════════════

/// Linear interpolation between neighbouring frames
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn render(&self, request: RenderRequest<'_>, cancel: &CancelToken) -> OfflineResult<PcmBuffer> {
        request.validate()?;

        let remixed = remix(
            request.source,
            request.start_frame,
            request.frame_count,
            request.target_channels,
        );
        if request.source.sample_rate == request.target_rate {
            return Ok(PcmBuffer::from_channels(remixed, request.target_rate));
        }

        cancel.check()?;

        let out_frames = request.expected_frames();
        let ratio = request.source.sample_rate as f64 / request.target_rate as f64;
        let last = request.frame_count - 1;

        let channels = remixed
            .iter()
            .map(|input| {
                (0..out_frames)
                    .map(|i| {
                        let pos = i as f64 * ratio;
                        let idx = pos.floor() as usize;
                        if idx >= last {
                            return input[last];
                        }
                        let frac = pos - idx as f64;
                        input[idx] + (input[idx + 1] - input[idx]) * frac
                    })
                    .collect()
            })
            .collect();

        Ok(PcmBuffer::from_channels(channels, request.target_rate))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINC
// ═══════════════════════════════════════════════════════════════════════════════

/// Windowed-sinc resampler backed by rubato
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SincResampler {
    sinc_len: usize,
}

impl SincResampler {
    /// 128 taps, linear table interpolation
    pub fn medium() -> Self {
        Self { sinc_len: 128 }
    }

    /// 256 taps, cubic table interpolation
    pub fn best() -> Self {
        Self { sinc_len: 256 }
    }

    fn parameters(&self) -> SincInterpolationParameters {
        let interpolation = if self.sinc_len >= 256 {
            SincInterpolationType::Cubic
        } else {
            SincInterpolationType::Linear
        };

        SincInterpolationParameters {
            sinc_len: self.sinc_len,
            f_cutoff: 0.95,
            interpolation,
            oversampling_factor: self.sinc_len,
            window: WindowFunction::BlackmanHarris2,
        }
    }
}

impl Default for SincResampler {
    fn default() -> Self {
        Self::medium()
    }
}

impl Resampler for SincResampler {
    fn name(&self) -> &'static str {
        if self.sinc_len >= 256 { "sinc-best" } else { "sinc-medium" }
    }

    fn render(&self, request: RenderRequest<'_>, cancel: &CancelToken) -> OfflineResult<PcmBuffer> {
        request.validate()?;

        let remixed = remix(
            request.source,
            request.start_frame,
            request.frame_count,
            request.target_channels,
        );
        if request.source.sample_rate == request.target_rate {
            return Ok(PcmBuffer::from_channels(remixed, request.target_rate));
        }

        let channel_count = remixed.len();
        let ratio = request.target_rate as f64 / request.source.sample_rate as f64;
        let mut resampler = SincFixedIn::<f64>::new(
            ratio,
            1.0,
            self.parameters(),
            SINC_CHUNK_FRAMES,
            channel_count,
        )
        .map_err(|e| OfflineError::Render(format!("Failed to create resampler: {}", e)))?;

        // SincFixedIn starts its read position half a filter length back, so
        // output frame 0 is already centred on input frame 0.
        let wanted = request.expected_frames();
        let mut output: Vec<Vec<f64>> = (0..channel_count)
            .map(|_| Vec::with_capacity(wanted + SINC_CHUNK_FRAMES))
            .collect();

        let mut offset = 0;
        while offset + SINC_CHUNK_FRAMES <= request.frame_count {
            cancel.check()?;
            let chunk: Vec<&[f64]> = remixed
                .iter()
                .map(|c| &c[offset..offset + SINC_CHUNK_FRAMES])
                .collect();
            let rendered = resampler
                .process(&chunk, None)
                .map_err(|e| OfflineError::Render(format!("Resampling failed: {}", e)))?;
            append_chunk(&mut output, rendered);
            offset += SINC_CHUNK_FRAMES;
        }

        if offset < request.frame_count {
            cancel.check()?;
            let rest: Vec<&[f64]> = remixed.iter().map(|c| &c[offset..]).collect();
            let rendered = resampler
                .process_partial(Some(rest.as_slice()), None)
                .map_err(|e| OfflineError::Render(format!("Resampling failed: {}", e)))?;
            append_chunk(&mut output, rendered);
        }

        // Flush with silence until the last input frames have been interpolated.
        let max_flushes = wanted / SINC_CHUNK_FRAMES + 4;
        let mut flushes = 0;
        while output[0].len() < wanted && flushes < max_flushes {
            cancel.check()?;
            let rendered = resampler
                .process_partial(None::<&[Vec<f64>]>, None)
                .map_err(|e| OfflineError::Render(format!("Resampling failed: {}", e)))?;
            append_chunk(&mut output, rendered);
            flushes += 1;
        }

        for channel in output.iter_mut() {
            channel.resize(wanted, 0.0);
        }

        log::debug!(
            "{}: {} frames @ {} Hz -> {} frames @ {} Hz",
            self.name(),
            request.frame_count,
            request.source.sample_rate,
            wanted,
            request.target_rate
        );

        Ok(PcmBuffer::from_channels(output, request.target_rate))
    }
}

fn append_chunk(output: &mut [Vec<f64>], chunk: Vec<Vec<f64>>) {
    for (dest, src) in output.iter_mut().zip(chunk) {
        dest.extend_from_slice(&src);
    }
}
