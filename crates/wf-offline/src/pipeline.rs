//! Per-job conversion pipeline
//!
//! Runs one source through the full chain:
//! 1. Decode to planar f64 PCM
//! 2. Resolve the trim range to a frame slice
//! 3. Remix and resample to the target format
//! 4. Encode to a PCM WAV container
//!
//! The cancellation token is checked after every stage and inside the
//! decode, render and encode loops.

use crate::cancel::CancelToken;
use crate::config::OfflineConfig;
use crate::decoder::AudioDecoder;
use crate::encoder::{AudioEncoder, WavEncoder};
use crate::error::{OfflineError, OfflineResult};
use crate::formats::{ConversionSettings, output_name};
use crate::job::{ConversionResult, Diagnostic, SourceMedia, TrimProvenance};
use crate::resample::{RenderRequest, Resampler};
use crate::trim::{TrimOutcome, TrimRange, compute_slice};

/// Progress reported when decoding finishes
pub const PROGRESS_DECODED: u8 = 30;
/// Progress reported once the trim slice is known
pub const PROGRESS_TRIMMED: u8 = 35;
/// Progress reported when rendering finishes
pub const PROGRESS_RENDERED: u8 = 70;

// ═══════════════════════════════════════════════════════════════════════════════
// PCM BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Planar audio buffer (f64 for maximum precision)
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// One sample vector per channel, all the same length
    pub channels: Vec<Vec<f64>>,
    /// Sample rate
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Create an empty buffer
    pub fn new(channel_count: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![Vec::new(); channel_count],
            sample_rate,
        }
    }

    pub fn from_channels(channels: Vec<Vec<f64>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Every channel holds the same number of frames
    pub fn is_rectangular(&self) -> bool {
        self.channels.windows(2).all(|w| w[0].len() == w[1].len())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Largest absolute sample value across channels
    pub fn peak(&self) -> f64 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f64, |max, s| max.max(s.abs()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Converts a single source with fixed batch settings
pub struct ConversionPipeline<'a> {
    settings: ConversionSettings,
    config: &'a OfflineConfig,
    resampler: &'a dyn Resampler,
}

impl<'a> ConversionPipeline<'a> {
    pub fn new(
        settings: ConversionSettings,
        config: &'a OfflineConfig,
        resampler: &'a dyn Resampler,
    ) -> Self {
        Self {
            settings,
            config,
            resampler,
        }
    }

    /// Convert `source`, naming the output after `display_name`.
    ///
    /// `progress` receives integer percentages in increasing order.
    pub fn convert(
        &self,
        source: &SourceMedia,
        display_name: &str,
        trim: Option<TrimRange>,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(u8),
    ) -> OfflineResult<ConversionResult> {
        progress(0);

        // Decode
        let decoded = AudioDecoder::decode(
            source.data.clone(),
            &source.hint(),
            self.config.max_decoded_frames,
            cancel,
        )?;
        log::debug!(
            "{}: decoded {} frames, {} ch @ {} Hz",
            display_name,
            decoded.frames(),
            decoded.channel_count(),
            decoded.sample_rate
        );
        progress(PROGRESS_DECODED);
        cancel.check()?;

        // Trim
        let slice = compute_slice(decoded.frames(), decoded.sample_rate, trim);
        let mut diagnostics = Vec::new();
        if let TrimOutcome::FellBack(range) = slice.outcome {
            diagnostics.push(Diagnostic::TrimFallback {
                requested_start: range.start,
                requested_end: range.end,
            });
        }
        let provenance = slice.is_trimmed().then(|| TrimProvenance {
            trim_start: slice.start_frame as f64 / decoded.sample_rate as f64,
            trim_end: slice.end_frame as f64 / decoded.sample_rate as f64,
            original_duration: decoded.duration(),
        });
        progress(PROGRESS_TRIMMED);
        cancel.check()?;

        // Render
        let target_channels = self.settings.channels.channel_count();
        let request = RenderRequest::new(
            &decoded,
            slice.start_frame,
            slice.frame_count(),
            self.settings.sample_rate.as_u32(),
            target_channels,
        );
        let expected = request.expected_frames();
        let rendered = self.resampler.render(request, cancel)?;
        drop(decoded);

        if rendered.channel_count() != target_channels
            || rendered.is_empty()
            || !rendered.is_rectangular()
        {
            return Err(OfflineError::Render(format!(
                "{} produced {} ch x {} frames (lengths {:?}), expected {} ch",
                self.resampler.name(),
                rendered.channel_count(),
                rendered.frames(),
                rendered.channels.iter().map(Vec::len).collect::<Vec<_>>(),
                target_channels
            )));
        }
        if rendered.frames().abs_diff(expected) > 1 {
            log::warn!(
                "{}: rendered {} frames, expected {}",
                display_name,
                rendered.frames(),
                expected
            );
        }
        progress(PROGRESS_RENDERED);
        cancel.check()?;

        // Encode
        let encoder = WavEncoder::new(self.settings.bit_depth)
            .with_cancel_stride(self.config.cancel_stride_samples);
        let span = (100 - PROGRESS_RENDERED) as f64;
        let bytes = encoder.encode(&rendered, cancel, &mut |fraction| {
            progress(PROGRESS_RENDERED + (fraction * span) as u8);
        })?;

        Ok(ConversionResult {
            byte_size: bytes.len() as u64,
            bytes,
            output_name: output_name(display_name, encoder.extension()),
            duration_secs: rendered.duration(),
            format: self.settings.descriptor(),
            trim: provenance,
            diagnostics,
        })
    }
}
