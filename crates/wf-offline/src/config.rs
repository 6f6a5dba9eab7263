//! Configuration types for offline conversion

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OfflineError, OfflineResult};

/// Offline conversion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Largest accepted input in bytes
    pub max_input_bytes: u64,

    /// Decode budget: maximum decoded frames per job
    pub max_decoded_frames: u64,

    /// Encoder cancellation/progress stride (samples)
    pub cancel_stride_samples: usize,

    /// Number of buckets in a waveform preview
    pub waveform_buckets: usize,

    /// Inputs above this size get no waveform preview
    pub waveform_max_bytes: u64,

    /// Sample rate conversion quality
    pub src_quality: SrcQuality,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 2 * 1024 * 1024 * 1024, // 2 GiB
            max_decoded_frames: 48_000 * 60 * 60 * 6, // 6 h @ 48 kHz
            cancel_stride_samples: 100_000,
            waveform_buckets: 200,
            waveform_max_bytes: 200 * 1024 * 1024,
            src_quality: SrcQuality::default(),
        }
    }
}

impl OfflineConfig {
    /// Create config for maximum quality (slower)
    pub fn quality() -> Self {
        Self {
            src_quality: SrcQuality::Best,
            ..Default::default()
        }
    }

    /// Create config for maximum speed
    pub fn fast() -> Self {
        Self {
            src_quality: SrcQuality::Quick,
            cancel_stride_samples: 250_000,
            ..Default::default()
        }
    }

    /// Set maximum input size
    pub fn with_max_input_bytes(mut self, bytes: u64) -> Self {
        self.max_input_bytes = bytes;
        self
    }

    /// Set decode budget
    pub fn with_max_decoded_frames(mut self, frames: u64) -> Self {
        self.max_decoded_frames = frames;
        self
    }

    /// Set encoder cancellation stride
    pub fn with_cancel_stride(mut self, samples: usize) -> Self {
        self.cancel_stride_samples = samples;
        self
    }

    /// Set sample rate conversion quality
    pub fn with_src_quality(mut self, quality: SrcQuality) -> Self {
        self.src_quality = quality;
        self
    }

    /// Check that every limit is usable
    pub fn validate(&self) -> OfflineResult<()> {
        if self.max_input_bytes == 0 {
            return Err(OfflineError::InvalidConfig("max_input_bytes must be > 0".into()));
        }
        if self.max_decoded_frames == 0 {
            return Err(OfflineError::InvalidConfig("max_decoded_frames must be > 0".into()));
        }
        if self.cancel_stride_samples == 0 {
            return Err(OfflineError::InvalidConfig("cancel_stride_samples must be > 0".into()));
        }
        if self.waveform_buckets == 0 {
            return Err(OfflineError::InvalidConfig("waveform_buckets must be > 0".into()));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> OfflineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> OfflineResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Sample rate conversion quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrcQuality {
    /// Linear interpolation
    Quick,
    /// Windowed sinc, 128 taps
    Medium,
    /// Windowed sinc, 256 taps
    Best,
}

impl Default for SrcQuality {
    fn default() -> Self {
        Self::Medium
    }
}
