//! Conversion targets and per-batch settings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wf_core::{BitDepth, ChannelMode, SampleRate};

use crate::error::{OfflineError, OfflineResult};

/// Requested output format label.
///
/// Only the uncompressed RIFF/WAVE encoder exists; every label produces WAV
/// bytes. The label is kept in the result descriptor so callers can see what
/// was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Aac,
    M4a,
}

impl TargetFormat {
    /// Nominal extension for this label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Aac => "aac",
            Self::M4a => "m4a",
        }
    }

    /// Extension of the bytes actually produced
    pub fn encoded_extension(&self) -> &'static str {
        "wav"
    }

    /// True when the label names the format that is really encoded
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Wav)
    }
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self::Wav
    }
}

impl FromStr for TargetFormat {
    type Err = OfflineError;

    fn from_str(s: &str) -> OfflineResult<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" | "wave" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "flac" => Ok(Self::Flac),
            "ogg" => Ok(Self::Ogg),
            "aac" => Ok(Self::Aac),
            "m4a" => Ok(Self::M4a),
            other => Err(OfflineError::InvalidConfig(format!("Unknown format label: {}", other))),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Settings shared by every job in one batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub format: TargetFormat,
    pub sample_rate: SampleRate,
    pub bit_depth: BitDepth,
    pub channels: ChannelMode,
}

impl ConversionSettings {
    pub fn new(
        format: TargetFormat,
        sample_rate: SampleRate,
        bit_depth: BitDepth,
        channels: ChannelMode,
    ) -> Self {
        Self {
            format,
            sample_rate,
            bit_depth,
            channels,
        }
    }

    /// 44.1 kHz / 16-bit / stereo WAV
    pub fn cd_quality() -> Self {
        Self::default()
    }

    pub fn descriptor(&self) -> FormatDescriptor {
        FormatDescriptor {
            label: self.format,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            channels: self.channels,
        }
    }
}

/// Format of an encoded result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub label: TargetFormat,
    pub sample_rate: SampleRate,
    pub bit_depth: BitDepth,
    pub channels: ChannelMode,
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WAV {} / {} / {}",
            self.sample_rate, self.bit_depth, self.channels
        )
    }
}

/// Derive the output file name: the display name with its extension
/// replaced by `extension`.
pub fn output_name(display_name: &str, extension: &str) -> String {
    let trimmed = display_name.trim();
    let stem = match trimmed.rfind('.') {
        Some(idx) if idx > 0 => &trimmed[..idx],
        _ => trimmed,
    };
    let stem = if stem.is_empty() { "output" } else { stem };
    format!("{}.{}", stem, extension)
}
